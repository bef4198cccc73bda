//! SAML metadata inspection and the signature policy.

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;

use idforge_core::{Error, Result};
use idforge_domain::SamlIdpConfig;

/// What we extract from IDP metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlMetadata {
    pub entity_id: String,
}

/// Inspect inline metadata XML. The document must contain an
/// `EntityDescriptor` carrying an `entityID`.
pub fn parse_metadata(xml: &[u8]) -> Result<SamlMetadata> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => {
                let name = e.name();
                let local = name.local_name();
                if local.as_ref() == b"EntityDescriptor" {
                    let entity_id = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"entityID")
                        .and_then(|a| String::from_utf8(a.value.into_owned()).ok())
                        .unwrap_or_default();
                    if entity_id.is_empty() {
                        return Err(Error::invalid_argument(
                            "IDP-sm01",
                            "metadata EntityDescriptor is missing entityID",
                        ));
                    }
                    return Ok(SamlMetadata { entity_id });
                }
            }
            Ok(XmlEvent::Eof) => {
                return Err(Error::invalid_argument(
                    "IDP-sm02",
                    "metadata contains no EntityDescriptor",
                ));
            }
            Err(e) => {
                return Err(Error::invalid_argument(
                    "IDP-sm03",
                    format!("metadata is not well-formed xml: {e}"),
                ));
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Signature policy for inbound SAML responses.
///
/// With a certificate configured, verification is mandatory. Without one,
/// requests are refused rather than accepted unverified.
pub fn require_signature_verification(config: &SamlIdpConfig) -> Result<()> {
    if config.certificate.is_empty() {
        return Err(Error::precondition_failed(
            "IDP-sm04",
            "saml idp has no signing certificate configured; refusing unverifiable responses",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idforge_domain::SamlBinding;

    const METADATA: &str = r#"<?xml version="1.0"?>
        <md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata"
            entityID="https://idp.example.com/saml">
          <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/>
        </md:EntityDescriptor>"#;

    #[test]
    fn metadata_with_entity_descriptor_parses() {
        let metadata = parse_metadata(METADATA.as_bytes()).unwrap();
        assert_eq!(metadata.entity_id, "https://idp.example.com/saml");
    }

    #[test]
    fn metadata_without_entity_descriptor_is_rejected() {
        let err = parse_metadata(b"<other/>").unwrap_err();
        assert_eq!(err.kind, idforge_core::ErrorKind::InvalidArgument);
        assert!(parse_metadata(b"not xml <<<").is_err());
    }

    #[test]
    fn signature_policy_fails_closed() {
        let mut config = SamlIdpConfig {
            metadata_xml: METADATA.as_bytes().to_vec(),
            metadata_url: String::new(),
            binding: SamlBinding::HttpPost,
            with_signed_request: false,
            certificate: Vec::new(),
        };
        assert!(require_signature_verification(&config).is_err());
        config.certificate = b"-----BEGIN CERTIFICATE-----".to_vec();
        assert!(require_signature_verification(&config).is_ok());
    }
}
