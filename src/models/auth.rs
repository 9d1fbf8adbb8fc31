use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::ValueEnum;
use serde::Deserialize;
use tonic::metadata::{Ascii, MetadataValue};

use crate::config_err;
use crate::error::Result;

/// How the credential is presented in the `authorization` header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `token <pat>`, what Dremio expects for personal access tokens
    #[default]
    Token,
    /// `Bearer <pat>`
    Bearer,
    /// `Basic base64(user:password)`
    Basic,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Token(String),
    Bearer(String),
    Basic { username: String, password: String },
}

impl Credentials {
    /// Value of the `authorization` header, if any
    pub fn header_value(&self) -> Option<String> {
        match self {
            Credentials::None => None,
            Credentials::Token(pat) => Some(format!("token {}", pat)),
            Credentials::Bearer(pat) => Some(format!("Bearer {}", pat)),
            Credentials::Basic { username, password } => Some(format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", username, password))
            )),
        }
    }

    /// Header value as sent on the wire.
    /// Fails when the credentials contain characters a header cannot carry.
    pub fn metadata_value(&self) -> Result<Option<MetadataValue<Ascii>>> {
        match self.header_value() {
            Some(value) => value.parse::<MetadataValue<Ascii>>().map(Some).map_err(|_| {
                config_err!(
                    "{} credentials contain characters not allowed in a header",
                    self.scheme_name()
                )
            }),
            None => Ok(None),
        }
    }

    pub fn scheme_name(&self) -> &'static str {
        match self {
            Credentials::None => "none",
            Credentials::Token(_) => "token",
            Credentials::Bearer(_) => "bearer",
            Credentials::Basic { .. } => "basic",
        }
    }
}

// never print secrets
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials({})", self.scheme_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;

    #[test]
    fn header_values() {
        assert_eq!(Credentials::None.header_value(), None);
        assert_eq!(
            Credentials::Token("abc".to_owned()).header_value(),
            Some("token abc".to_owned())
        );
        assert_eq!(
            Credentials::Bearer("abc".to_owned()).header_value(),
            Some("Bearer abc".to_owned())
        );
        let basic = Credentials::Basic {
            username: "dremio".to_owned(),
            password: "dremio123".to_owned(),
        };
        assert_eq!(
            basic.header_value(),
            Some("Basic ZHJlbWlvOmRyZW1pbzEyMw==".to_owned())
        );
    }

    #[test]
    fn metadata_values() {
        assert!(Credentials::None.metadata_value().unwrap().is_none());
        let value = Credentials::Token("abc".to_owned())
            .metadata_value()
            .unwrap()
            .unwrap();
        assert_eq!(value.to_str().unwrap(), "token abc");
        match Credentials::Token("a\r\nb".to_owned()).metadata_value() {
            Err(ProbeError::Config(reason)) => assert!(reason.starts_with("token")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn debug_hides_secret() {
        let creds = Credentials::Token("super-secret".to_owned());
        assert_eq!(format!("{:?}", creds), "Credentials(token)");
    }
}
