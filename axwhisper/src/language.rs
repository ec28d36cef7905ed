//! Language code to language token lookup.
//!
//! Unknown codes silently fall back to Chinese (`"zh"`). The fallback keeps
//! the lookup infallible; callers that want to surface it can check
//! [`is_supported`] first.

/// `(code, token id)` pairs for every language the multilingual models know.
pub const LANGUAGES: [(&str, u32); 99] = [
    ("sv", 50273), ("sr", 50303), ("no", 50288), ("de", 50261), ("nn", 50342), ("te", 50299),
    ("be", 50330), ("bn", 50302), ("lo", 50336), ("pt", 50267), ("ta", 50287), ("bg", 50292),
    ("la", 50294), ("km", 50323), ("tl", 50348), ("hr", 50291), ("sq", 50317), ("so", 50326),
    ("th", 50289), ("jw", 50356), ("ur", 50290), ("ms", 50282), ("bo", 50347), ("tg", 50331),
    ("ha", 50354), ("ko", 50264), ("gu", 50333), ("ml", 50296), ("ht", 50339), ("sw", 50318),
    ("sl", 50305), ("lt", 50293), ("uk", 50280), ("si", 50322), ("hy", 50312), ("kn", 50306),
    ("ln", 50353), ("da", 50285), ("id", 50275), ("ps", 50340), ("vi", 50278), ("tr", 50268),
    ("uz", 50337), ("kk", 50316), ("ja", 50266), ("et", 50307), ("eu", 50310), ("fo", 50338),
    ("am", 50334), ("ne", 50313), ("tt", 50351), ("zh", 50260), ("sa", 50344), ("cs", 50283),
    ("af", 50327), ("ar", 50272), ("sn", 50324), ("hi", 50276), ("el", 50281), ("lv", 50301),
    ("sd", 50332), ("fa", 50300), ("br", 50309), ("mt", 50343), ("mg", 50349), ("yi", 50335),
    ("mr", 50320), ("en", 50259), ("ro", 50284), ("az", 50304), ("fi", 50277), ("is", 50311),
    ("gl", 50319), ("mn", 50314), ("haw", 50352), ("oc", 50328), ("hu", 50286), ("it", 50274),
    ("ka", 50329), ("ca", 50270), ("pl", 50269), ("as", 50350), ("ru", 50263), ("lb", 50345),
    ("sk", 50298), ("he", 50279), ("cy", 50297), ("es", 50262), ("bs", 50315), ("pa", 50321),
    ("mk", 50308), ("ba", 50355), ("fr", 50265), ("my", 50346), ("mi", 50295), ("nl", 50271),
    ("su", 50357), ("tk", 50341), ("yo", 50325),
];

/// Table index used for unknown codes.
pub const FALLBACK_INDEX: usize = 51;

/// Token id of the fallback language (`"zh"`).
pub const FALLBACK_TOKEN: u32 = LANGUAGES[FALLBACK_INDEX].1;

/// Look up the language token for an exact code match.
pub fn token_id(code: &str) -> u32 {
    LANGUAGES
        .iter()
        .find(|(name, _)| *name == code)
        .map_or(FALLBACK_TOKEN, |&(_, id)| id)
}

/// Whether `code` has its own entry (no fallback).
pub fn is_supported(code: &str) -> bool {
    LANGUAGES.iter().any(|(name, _)| *name == code)
}
