use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Integer identifier of a stored link.
pub type LinkId = u64;

/// Digit symbols in ascending value order. The symbol at index `i` stands for
/// the digit value `i + 1`; there is no zero digit.
const ALPHABET: &[u8; 62] = b"1234567890aAbBcCdDeEfFgGhHiIjJkKlLmMnNoOpPqQrRsStTuUvVwWxXyYzZ";

const BASE: u64 = ALPHABET.len() as u64;
const NOT_A_DIGIT: u8 = u8::MAX;

/// Longest token the codec will produce or accept.
pub const MAX_LENGTH: usize = 8;

/// Largest encodable id, the value of `"ZZZZZZZZ"`.
///
/// Equals `62 + 62^2 + ... + 62^8 - 1`, which covers the whole `0..62^8` range.
pub const MAX_LINK_ID: LinkId = 221_919_451_578_089;

/// Path segment that precedes a token in a short link.
pub const PATH_PREFIX: &str = "/+/";

static DIGIT_VALUES: [u8; 128] = digit_values();

const fn digit_values() -> [u8; 128] {
    let mut table = [NOT_A_DIGIT; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// A validated short token, the bijective base-62 image of a [`LinkId`].
///
/// The first character is the least significant digit, so `"z"` followed by
/// seven `"Z"` is one less than eight `"Z"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortCode(String);

impl ShortCode {
    /// Encodes a link id as a token of 1 to 8 characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use hop_core::ShortCode;
    ///
    /// assert_eq!(ShortCode::encode(0).unwrap().as_str(), "1");
    /// assert_eq!(ShortCode::encode(1).unwrap().as_str(), "2");
    /// ```
    pub fn encode(id: LinkId) -> Result<Self, CoreError> {
        if id > MAX_LINK_ID {
            return Err(CoreError::LinkIdOutOfRange(id));
        }

        let mut remaining = id + 1;
        let mut code = String::with_capacity(MAX_LENGTH);
        while remaining > 0 {
            remaining -= 1;
            code.push(ALPHABET[(remaining % BASE) as usize] as char);
            remaining /= BASE;
        }

        Ok(Self(code))
    }

    /// Validates a bare token.
    ///
    /// Valid tokens are 1-8 characters from `[0-9a-zA-Z]`.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        if token.is_empty() || token.len() > MAX_LENGTH {
            return Err(CoreError::InvalidShortCode(format!(
                "length must be between 1 and {}, got {}",
                MAX_LENGTH,
                token.len()
            )));
        }

        if let Some(c) = token.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidShortCode(format!(
                "unexpected character '{}' in '{}'",
                c, token
            )));
        }

        Ok(Self(token.to_owned()))
    }

    /// Validates a request path of the form `/+/<token>`.
    pub fn from_path(path: &str) -> Result<Self, CoreError> {
        let token = path.strip_prefix(PATH_PREFIX).ok_or_else(|| {
            CoreError::InvalidShortCode(format!("path must start with '{}'", PATH_PREFIX))
        })?;
        Self::parse(token)
    }

    /// Returns the link id this token stands for.
    pub fn link_id(&self) -> LinkId {
        // parse/encode guarantee at least one digit, so the sum is >= 1
        self.0
            .bytes()
            .rev()
            .fold(0, |acc, b| acc * BASE + u64::from(DIGIT_VALUES[b as usize]) + 1)
            - 1
    }

    /// Generates the full short link based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}{}{}", base_url.trim_end_matches('/'), PATH_PREFIX, self.0)
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Decodes a bare token, returning `None` for anything [`ShortCode::parse`] rejects.
pub fn decode(token: &str) -> Option<LinkId> {
    ShortCode::parse(token).ok().map(|code| code.link_id())
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ShortCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShortCode> for String {
    fn from(code: ShortCode) -> Self {
        code.0
    }
}
