use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Character encoding used by the text operations of a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8. Invalid sequences decode to `U+FFFD`.
    #[default]
    Utf8,

    /// ISO-8859-1. Characters above `U+00FF` encode as `?`.
    Latin1,
}

impl Charset {
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        match self {
            Charset::Utf8 => Cow::Borrowed(text.as_bytes()),
            Charset::Latin1 if text.is_ascii() => Cow::Borrowed(text.as_bytes()),
            Charset::Latin1 => Cow::Owned(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Utf8 => f.write_str("UTF-8"),
            Charset::Latin1 => f.write_str("ISO-8859-1"),
        }
    }
}

/// Returned when a charset name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown charset `{0}`")]
pub struct UnknownCharset(pub String);

impl FromStr for Charset {
    type Err = UnknownCharset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            _ => Err(UnknownCharset(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_round_trips_high_bytes() {
        let text = Charset::Latin1.decode(&[b'c', 0xE9]);
        assert_eq!(text, "cé");
        assert_eq!(&*Charset::Latin1.encode(&text), &[b'c', 0xE9]);
    }

    #[test]
    fn latin1_replaces_unrepresentable() {
        assert_eq!(&*Charset::Latin1.encode("a€"), b"a?");
    }

    #[test]
    fn parses_names() {
        assert_eq!("UTF-8".parse::<Charset>(), Ok(Charset::Utf8));
        assert_eq!("latin1".parse::<Charset>(), Ok(Charset::Latin1));
        assert!("ebcdic".parse::<Charset>().is_err());
    }
}
