//! Line protocol spoken by the tag reader firmware
//!
//! The microcontroller prints one message per line:
//!
//! ```text
//! Album URI:"spotify:album:4aawyAB9vmqN3uQ7FjRGTy"
//! VOLUME:42
//! ```
//!
//! Anything else (boot banners, debug output) is ignored.
//!
//! Two framings exist for the album payload. `quoted` takes the URI from
//! between the first pair of double quotes, or the whole trimmed payload when
//! there are no quotes. `legacy` reproduces the first firmware's fixed slice:
//! drop 9 characters from the front and 2 from the back of the trimmed
//! payload. Use `legacy` only with firmware that depends on it.

use std::str::FromStr;

use crate::throttle::Volume;

/// Prefix of an album message
pub const ALBUM_PREFIX: &str = "Album URI:";

/// Prefix of a volume message
pub const VOLUME_PREFIX: &str = "VOLUME:";

/// Characters dropped from the front of a legacy album payload
const LEGACY_HEAD: usize = 9;

/// Characters dropped from the back of a legacy album payload
const LEGACY_TAIL: usize = 2;

/// How the URI is framed inside an album message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Fixed-offset slice of the trimmed payload
    Legacy,
    /// Text between double quotes, or the bare payload
    #[default]
    Quoted,
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "quoted" => Ok(Self::Quoted),
            other => Err(format!("unknown framing {other:?} (expected \"legacy\" or \"quoted\")")),
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Quoted => f.write_str("quoted"),
        }
    }
}

/// A classified line from the serial link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLine {
    /// Blank line (read timeout or bare newline)
    Empty,
    /// Album message with the extracted URI
    AlbumUri(String),
    /// Volume message
    Volume(Volume),
    /// Recognised prefix with an unusable payload
    Invalid(String),
    /// Not a message this bridge understands
    Unknown(String),
}

impl DeviceLine {
    /// Classify one line
    #[must_use]
    pub fn parse(line: &str, framing: Framing) -> Self {
        let line = line.trim_end();

        if line.trim_start().is_empty() {
            return Self::Empty;
        }

        if let Some(payload) = line.strip_prefix(ALBUM_PREFIX) {
            return match extract_uri(payload.trim(), framing) {
                Ok(uri) => Self::AlbumUri(uri),
                Err(reason) => Self::Invalid(reason),
            };
        }

        if let Some(payload) = line.strip_prefix(VOLUME_PREFIX) {
            return match payload.parse::<Volume>() {
                Ok(volume) => Self::Volume(volume),
                Err(e) => Self::Invalid(e.to_string()),
            };
        }

        Self::Unknown(line.to_string())
    }
}

fn extract_uri(payload: &str, framing: Framing) -> Result<String, String> {
    match framing {
        Framing::Legacy => {
            let chars: Vec<char> = payload.chars().collect();
            if chars.len() <= LEGACY_HEAD + LEGACY_TAIL {
                return Err(format!("album payload too short: {payload:?}"));
            }
            Ok(chars[LEGACY_HEAD..chars.len() - LEGACY_TAIL].iter().collect())
        }
        Framing::Quoted => {
            let uri = match payload.split_once('"') {
                Some((_, rest)) => {
                    let (inner, _) = rest
                        .split_once('"')
                        .ok_or_else(|| format!("unterminated quote in album payload: {payload:?}"))?;
                    inner.trim()
                }
                None => payload,
            };

            if uri.is_empty() {
                Err("empty album URI".to_string())
            } else {
                Ok(uri.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_line() {
        assert_eq!(
            DeviceLine::parse("VOLUME:42", Framing::Quoted),
            DeviceLine::Volume(Volume::new(42).unwrap())
        );
        assert_eq!(
            DeviceLine::parse("VOLUME: 7\r", Framing::Legacy),
            DeviceLine::Volume(Volume::new(7).unwrap())
        );
    }

    #[test]
    fn malformed_volume_is_invalid_not_fatal() {
        // Used to abort the reader loop with an unhandled parse error
        assert!(matches!(
            DeviceLine::parse("VOLUME:abc", Framing::Quoted),
            DeviceLine::Invalid(_)
        ));
        // Used to be forwarded without a range check
        assert!(matches!(
            DeviceLine::parse("VOLUME:140", Framing::Quoted),
            DeviceLine::Invalid(_)
        ));
    }

    #[test]
    fn quoted_album_uri() {
        assert_eq!(
            DeviceLine::parse("Album URI:\"spotify:album:abc123\"", Framing::Quoted),
            DeviceLine::AlbumUri("spotify:album:abc123".to_string())
        );
        assert_eq!(
            DeviceLine::parse("Album URI: spotify:album:abc123 ", Framing::Quoted),
            DeviceLine::AlbumUri("spotify:album:abc123".to_string())
        );
        assert_eq!(
            DeviceLine::parse("Album URI: [\"spotify:playlist:p1\"]", Framing::Quoted),
            DeviceLine::AlbumUri("spotify:playlist:p1".to_string())
        );
    }

    #[test]
    fn quoted_album_rejects_broken_payloads() {
        assert!(matches!(
            DeviceLine::parse("Album URI:\"spotify:album:abc", Framing::Quoted),
            DeviceLine::Invalid(_)
        ));
        assert!(matches!(
            DeviceLine::parse("Album URI:\"\"", Framing::Quoted),
            DeviceLine::Invalid(_)
        ));
        assert!(matches!(
            DeviceLine::parse("Album URI:   ", Framing::Quoted),
            DeviceLine::Invalid(_)
        ));
    }

    #[test]
    fn legacy_album_uses_fixed_slice() {
        // 9 characters off the front, 2 off the back of the trimmed payload
        assert_eq!(
            DeviceLine::parse("Album URI:\"spotify:album:abc123\"", Framing::Legacy),
            DeviceLine::AlbumUri("album:abc12".to_string())
        );
        assert_eq!(
            DeviceLine::parse("Album URI: \u{2}enspotify:album:abc123\"]", Framing::Legacy),
            DeviceLine::AlbumUri("ify:album:abc123".to_string())
        );
    }

    #[test]
    fn legacy_album_too_short() {
        assert!(matches!(
            DeviceLine::parse("Album URI:\"short\"", Framing::Legacy),
            DeviceLine::Invalid(_)
        ));
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(DeviceLine::parse("", Framing::Quoted), DeviceLine::Empty);
        assert_eq!(DeviceLine::parse("  \r\n", Framing::Quoted), DeviceLine::Empty);
        assert_eq!(
            DeviceLine::parse("Reader ready", Framing::Quoted),
            DeviceLine::Unknown("Reader ready".to_string())
        );
        // Prefixes are case-sensitive and anchored at the line start
        assert!(matches!(
            DeviceLine::parse("volume:42", Framing::Quoted),
            DeviceLine::Unknown(_)
        ));
        assert!(matches!(
            DeviceLine::parse(" VOLUME:42", Framing::Quoted),
            DeviceLine::Unknown(_)
        ));
    }

    #[test]
    fn framing_from_str() {
        assert_eq!("Legacy".parse::<Framing>(), Ok(Framing::Legacy));
        assert_eq!("quoted".parse::<Framing>(), Ok(Framing::Quoted));
        assert!("fixed".parse::<Framing>().is_err());
    }
}
