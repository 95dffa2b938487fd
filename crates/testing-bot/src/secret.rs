//! Bot credential loading

use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurposeConfig, DecodePaddingMode, GeneralPurpose},
    Engine,
};
use serenity::model::id::UserId;

use crate::{prelude::*, util::DebugShim};

/// Discord pads the leading token segment inconsistently, so accept either
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("Token is empty")]
    Empty,
    #[error("Leading token segment is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Leading token segment is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Leading token segment is not a numeric ID: {0}")]
    Number(#[from] std::num::ParseIntError),
    #[error("Leading token segment decodes to a zero ID")]
    Zero,
}

/// Decode the numeric bot user ID from the first dot-delimited segment of a
/// token
pub fn decode_id(token: &str) -> Result<UserId, IdError> {
    let segment = token.split('.').next().unwrap_or_default();

    if segment.is_empty() {
        return Err(IdError::Empty);
    }

    let bytes = SEGMENT_ENGINE.decode(segment)?;
    let id: u64 = String::from_utf8(bytes)?.parse()?;

    if id == 0 {
        return Err(IdError::Zero);
    }

    Ok(UserId::new(id))
}

/// A bot token and the user ID encoded within it
#[derive(Debug, Clone)]
pub struct Credential {
    token: DebugShim<String>,
    id: UserId,
}

impl FromStr for Credential {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim_end().to_owned();
        let id = decode_id(&token)?;

        Ok(Self {
            token: token.into(),
            id,
        })
    }
}

impl Credential {
    #[instrument(level = "debug")]
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Error reading bot token from {path:?}"))?;

        let cred: Self = raw
            .parse()
            .with_context(|| format!("Invalid bot token in {path:?}"))?;

        debug!(id = %cred.id, "Loaded bot credential");
        Ok(cred)
    }

    #[inline]
    pub fn token(&self) -> &str { &self.token.0 }

    #[inline]
    pub fn id(&self) -> UserId { self.id }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use base64::Engine;
    use proptest::prelude::*;

    use super::{decode_id, Credential, IdError, SEGMENT_ENGINE};

    #[test]
    fn test_decode_id() {
        assert_eq!(decode_id("MTIz.signature.payload").unwrap().get(), 123);
    }

    #[test]
    fn test_decode_padded() {
        // "12" encodes with one padding character
        assert_eq!(decode_id("MTI=.x.y").unwrap().get(), 12);
        assert_eq!(decode_id("MTI.x.y").unwrap().get(), 12);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_id(""), Err(IdError::Empty)));
        assert!(matches!(decode_id(".a.b"), Err(IdError::Empty)));
        assert!(matches!(decode_id("!!!.a.b"), Err(IdError::Base64(_))));
        // "abc"
        assert!(matches!(decode_id("YWJj.a.b"), Err(IdError::Number(_))));
        // "0"
        assert!(matches!(decode_id("MA.a.b"), Err(IdError::Zero)));
    }

    #[test]
    fn test_parse_strips_newline() {
        let cred: Credential = "MTIz.signature.payload\n".parse().unwrap();
        assert_eq!(cred.token(), "MTIz.signature.payload");
        assert_eq!(cred.id().get(), 123);
    }

    #[test]
    fn test_debug_hides_token() {
        let cred: Credential = "MTIz.signature.payload".parse().unwrap();
        assert!(!format!("{cred:?}").contains("signature"));
    }

    #[tokio::test]
    async fn test_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MTIz.signature.payload").unwrap();

        let cred = Credential::load(file.path()).await.unwrap();
        assert_eq!(cred.token(), "MTIz.signature.payload");
        assert_eq!(cred.id().get(), 123);
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Credential::load(&dir.path().join("token")).await.is_err());
    }

    proptest::proptest! {
        #[test]
        fn test_decode_any_id(id in 1_u64.., rest in "[A-Za-z0-9_-]{0,16}") {
            let token = format!("{}.{rest}.sig", SEGMENT_ENGINE.encode(id.to_string()));
            prop_assert_eq!(decode_id(&token).unwrap().get(), id);
        }
    }
}
