//! Self-signed certificate issuance and inspection
//!
//! Certificates are self-signed leaf certificates suitable for TLS server
//! authentication. The subject alternative name list always starts with the
//! common name, followed by the service's DNS names in sorted order:
//!
//! ```text
//! CN  = {namespace}-{secretName}
//! SAN = [CN, svc.ns, svc.ns.svc, svc.ns.svc.cluster.local, <extra names...>]
//! ```
//!
//! A stored certificate is considered current when it does not expire within
//! the renewal window and `SAN[1..]` equals the expected DNS names exactly.

use std::fmt;
use std::time::Duration;

use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType, string::Ia5String,
};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::Pem;

use crate::error::{CoreError, Result};

/// Clock skew tolerance applied to `not_before` of issued certificates
const BACKDATE: Duration = Duration::from_secs(60);

/// PEM-encoded keypair produced by [`issue_self_signed`]
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("cert_pem", &self.cert_pem)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh key and a self-signed certificate for it
///
/// The SAN list is `[common_name] ++ dns_names`, in that order.
pub fn issue_self_signed(
    common_name: &str,
    dns_names: &[String],
    validity: Duration,
) -> Result<IssuedCertificate> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    params.distinguished_name = dn;

    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - BACKDATE;
    params.not_after = now + validity;

    params.subject_alt_names = std::iter::once(common_name)
        .chain(dns_names.iter().map(String::as_str))
        .map(|name| {
            Ia5String::try_from(name.to_string())
                .map(SanType::DnsName)
                .map_err(|e| CoreError::InvalidDnsName {
                    name: name.to_string(),
                    message: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let key_pair = KeyPair::generate().map_err(|e| CoreError::KeyGeneration {
        message: e.to_string(),
    })?;
    let key_pem = key_pair.serialize_pem();

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CoreError::CertificateGeneration {
            message: e.to_string(),
        })?;

    Ok(IssuedCertificate {
        cert_pem: cert.pem(),
        key_pem,
    })
}

/// Validity and naming details of a parsed certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// DNS subject alternative names, in certificate order
    pub dns_names: Vec<String>,
}

impl CertificateInfo {
    /// Seconds remaining until expiry, relative to `now`
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.not_after - now
    }

    /// Whether the certificate expires before `now + window`
    pub fn expires_within(&self, window: Duration, now: i64) -> bool {
        let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        self.not_after < now.saturating_add(window)
    }

    /// Whether `SAN[1..]` equals `expected` element for element
    pub fn sans_match(&self, expected: &[String]) -> bool {
        self.dns_names.get(1..).unwrap_or_default() == expected
    }

    /// Decide whether this certificate has to be replaced
    pub fn rotation_reason(
        &self,
        expected_dns_names: &[String],
        renewal_window: Duration,
        now: i64,
    ) -> Option<RotationReason> {
        if self.expires_within(renewal_window, now) {
            Some(RotationReason::Expiring {
                remaining_secs: self.remaining_secs(now),
            })
        } else if !self.sans_match(expected_dns_names) {
            Some(RotationReason::NamesChanged)
        } else {
            None
        }
    }
}

/// Why a stored certificate is being replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationReason {
    /// Leaf expires inside the renewal window
    Expiring { remaining_secs: i64 },
    /// The DNS names no longer match the service
    NamesChanged,
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationReason::Expiring { remaining_secs } if *remaining_secs <= 0 => {
                write!(f, "certificate expired")
            }
            RotationReason::Expiring { remaining_secs } => {
                write!(f, "certificate expires in {remaining_secs}s")
            }
            RotationReason::NamesChanged => write!(f, "DNS names changed"),
        }
    }
}

/// Parse every certificate in a PEM bundle, leaf first
///
/// Non-certificate PEM blocks are skipped. An input without any certificate
/// is an [`CoreError::EmptyChain`].
pub fn parse_chain(pem_bytes: &[u8]) -> Result<Vec<CertificateInfo>> {
    let mut chain = Vec::new();

    for pem in Pem::iter_from_buffer(pem_bytes) {
        let pem = pem.map_err(|e| CoreError::CertificateDecode {
            message: e.to_string(),
        })?;
        if pem.label != "CERTIFICATE" {
            continue;
        }
        let cert = pem.parse_x509().map_err(|e| CoreError::CertificateDecode {
            message: e.to_string(),
        })?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let dns_names = match cert.subject_alternative_name() {
            Ok(Some(san)) => san
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                return Err(CoreError::CertificateDecode {
                    message: e.to_string(),
                });
            }
        };

        chain.push(CertificateInfo {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            dns_names,
        });
    }

    if chain.is_empty() {
        return Err(CoreError::EmptyChain);
    }
    Ok(chain)
}

/// Parse only the leaf certificate of a PEM bundle
pub fn parse_leaf(pem_bytes: &[u8]) -> Result<CertificateInfo> {
    parse_chain(pem_bytes)?
        .into_iter()
        .next()
        .ok_or(CoreError::EmptyChain)
}

/// Current Unix timestamp
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn names() -> Vec<String> {
        vec![
            "svc.ns".to_string(),
            "svc.ns.svc".to_string(),
            "svc.ns.svc.cluster.local".to_string(),
        ]
    }

    #[test]
    fn test_issue_and_parse() {
        let issued = issue_self_signed("ns-mysecret", &names(), 365 * DAY).unwrap();
        assert!(issued.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(issued.key_pem.contains("PRIVATE KEY"));

        let info = parse_leaf(issued.cert_pem.as_bytes()).unwrap();
        assert_eq!(info.common_name, "ns-mysecret");
        assert_eq!(
            info.dns_names,
            vec![
                "ns-mysecret",
                "svc.ns",
                "svc.ns.svc",
                "svc.ns.svc.cluster.local"
            ]
        );
        assert!(info.sans_match(&names()));
    }

    #[test]
    fn test_fresh_certificate_needs_no_rotation() {
        let issued = issue_self_signed("ns-mysecret", &names(), 365 * DAY).unwrap();
        let info = parse_leaf(issued.cert_pem.as_bytes()).unwrap();
        assert_eq!(info.rotation_reason(&names(), DAY, unix_now()), None);
    }

    #[test]
    fn test_expiring_certificate_rotates() {
        let issued = issue_self_signed("ns-mysecret", &names(), Duration::from_secs(1)).unwrap();
        let info = parse_leaf(issued.cert_pem.as_bytes()).unwrap();
        assert!(matches!(
            info.rotation_reason(&names(), DAY, unix_now()),
            Some(RotationReason::Expiring { .. })
        ));
    }

    #[test]
    fn test_certificate_beyond_window_is_kept() {
        let issued = issue_self_signed("ns-mysecret", &names(), 2 * DAY).unwrap();
        let info = parse_leaf(issued.cert_pem.as_bytes()).unwrap();
        assert!(!info.expires_within(DAY, unix_now()));
        assert_eq!(info.rotation_reason(&names(), DAY, unix_now()), None);
    }

    #[test]
    fn test_name_drift_rotates() {
        let issued = issue_self_signed("ns-mysecret", &names(), 365 * DAY).unwrap();
        let info = parse_leaf(issued.cert_pem.as_bytes()).unwrap();

        let mut wanted = names();
        wanted.push("x".to_string());
        wanted.sort();
        assert_eq!(
            info.rotation_reason(&wanted, DAY, unix_now()),
            Some(RotationReason::NamesChanged)
        );
    }

    #[test]
    fn test_sans_match_is_order_sensitive() {
        let info = CertificateInfo {
            not_before: 0,
            not_after: i64::MAX,
            common_name: "cn".to_string(),
            dns_names: vec!["cn".to_string(), "b".to_string(), "a".to_string()],
        };
        assert!(!info.sans_match(&["a".to_string(), "b".to_string()]));
        assert!(info.sans_match(&["b".to_string(), "a".to_string()]));
    }

    #[test]
    fn test_parse_garbage_fails() {
        let result = parse_chain(b"-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n");
        assert!(matches!(result, Err(CoreError::CertificateDecode { .. })));
    }

    #[test]
    fn test_parse_empty_is_empty_chain() {
        assert!(matches!(parse_chain(b""), Err(CoreError::EmptyChain)));
    }

    #[test]
    fn test_parse_key_only_is_empty_chain() {
        let issued = issue_self_signed("ns-mysecret", &names(), DAY).unwrap();
        assert!(matches!(
            parse_chain(issued.key_pem.as_bytes()),
            Err(CoreError::EmptyChain)
        ));
    }

    #[test]
    fn test_invalid_dns_name_rejected() {
        let result = issue_self_signed("ns-mysecret", &["bücher.example".to_string()], DAY);
        assert!(matches!(result, Err(CoreError::InvalidDnsName { .. })));
    }

    #[test]
    fn test_issued_debug_redacts_key() {
        let issued = issue_self_signed("ns-mysecret", &names(), DAY).unwrap();
        let debug = format!("{:?}", issued);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
