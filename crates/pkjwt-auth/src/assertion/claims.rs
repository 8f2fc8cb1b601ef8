//! Client assertion claim set (RFC 7523 Section 3).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Registered claim names.
pub mod names {
    pub const ISSUER: &str = "iss";
    pub const SUBJECT: &str = "sub";
    pub const AUDIENCE: &str = "aud";
    pub const EXPIRATION: &str = "exp";
    pub const NOT_BEFORE: &str = "nbf";
    pub const ISSUED_AT: &str = "iat";
    pub const JWT_ID: &str = "jti";
}

/// Claims carried by a client assertion.
///
/// Registered claims are typed; anything else lands in `custom`. A claim that
/// is absent (or JSON `null`) is `None`, while an empty string is
/// `Some(String::new())`, so the two stay distinguishable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject, the client identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience. A single string or an array of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration time as Unix timestamp.
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,

    /// Not-before time as Unix timestamp.
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,

    /// Issued-at time as Unix timestamp.
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,

    /// JWT ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Any non-registered claims.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl AssertionClaims {
    /// Returns the subject when present and non-empty.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        non_empty(self.sub.as_deref())
    }

    /// Returns the issuer when present and non-empty.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        non_empty(self.iss.as_deref())
    }

    /// Returns the JWT ID when present and non-empty.
    #[must_use]
    pub fn jwt_id(&self) -> Option<&str> {
        non_empty(self.jti.as_deref())
    }

    /// Returns `true` if the named claim is present with a non-empty value.
    ///
    /// Empty strings, empty arrays, empty objects and `null` count as empty.
    #[must_use]
    pub fn has_claim(&self, name: &str) -> bool {
        match name {
            names::ISSUER => self.issuer().is_some(),
            names::SUBJECT => self.subject().is_some(),
            names::AUDIENCE => self.aud.as_ref().is_some_and(|aud| !aud.is_empty()),
            names::EXPIRATION => self.exp.is_some(),
            names::NOT_BEFORE => self.nbf.is_some(),
            names::ISSUED_AT => self.iat.is_some(),
            names::JWT_ID => self.jwt_id().is_some(),
            other => self.custom.get(other).is_some_and(|value| match value {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
                Value::Bool(_) | Value::Number(_) => true,
            }),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Audience claim can be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience value.
    Single(String),
    /// Array of audience values.
    Multiple(Vec<String>),
}

impl Audience {
    /// Checks if the audience contains the specified value.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.iter().any(|aud| aud == value)
    }

    /// Iterates over the audience values.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::Single(s) => std::slice::from_ref(s),
            Self::Multiple(arr) => arr,
        };
        values.iter().map(String::as_str)
    }

    /// Returns `true` if there is no non-empty audience value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().all(str::is_empty)
    }
}

/// Accepts integer or fractional NumericDate values (RFC 7519 Section 2).
/// Fractions are truncated.
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumericDate {
        Integer(i64),
        Fractional(f64),
    }

    match Option::<NumericDate>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumericDate::Integer(secs)) => Ok(Some(secs)),
        Some(NumericDate::Fractional(secs)) if secs.is_finite() => Ok(Some(secs.trunc() as i64)),
        Some(NumericDate::Fractional(_)) => {
            Err(serde::de::Error::custom("NumericDate must be finite"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_contains() {
        let aud = Audience::Single("https://example.com/token".to_string());
        assert!(aud.contains("https://example.com/token"));
        assert!(!aud.contains("https://other.com/token"));

        let aud = Audience::Multiple(vec![
            "https://example.com/token".to_string(),
            "https://example.com/fhir".to_string(),
        ]);
        assert!(aud.contains("https://example.com/token"));
        assert!(aud.contains("https://example.com/fhir"));
        assert!(!aud.contains("https://example.com"));
    }

    #[test]
    fn test_audience_is_empty() {
        assert!(Audience::Multiple(vec![]).is_empty());
        assert!(Audience::Single(String::new()).is_empty());
        assert!(!Audience::Multiple(vec![String::new(), "a".to_string()]).is_empty());
    }

    #[test]
    fn test_deserialize_registered_and_custom_claims() {
        let claims: AssertionClaims = serde_json::from_str(
            r#"{"iss":"client-1","sub":"client-1","aud":["a","b"],"exp":1700000000,
                "iat":1699999000.75,"jti":"abc","tenant":"acme"}"#,
        )
        .unwrap();

        assert_eq!(claims.issuer(), Some("client-1"));
        assert_eq!(claims.subject(), Some("client-1"));
        assert_eq!(
            claims.aud,
            Some(Audience::Multiple(vec!["a".to_string(), "b".to_string()]))
        );
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.iat, Some(1_699_999_000));
        assert_eq!(claims.nbf, None);
        assert_eq!(claims.jwt_id(), Some("abc"));
        assert_eq!(claims.custom.get("tenant"), Some(&Value::from("acme")));
    }

    #[test]
    fn test_absent_and_empty_are_distinct() {
        let absent: AssertionClaims = serde_json::from_str(r#"{"iss":"c"}"#).unwrap();
        let empty: AssertionClaims = serde_json::from_str(r#"{"iss":"c","jti":""}"#).unwrap();

        assert_eq!(absent.jti, None);
        assert_eq!(empty.jti, Some(String::new()));
        assert!(!absent.has_claim("jti"));
        assert!(!empty.has_claim("jti"));
    }

    #[test]
    fn test_has_claim_custom_values() {
        let claims: AssertionClaims = serde_json::from_str(
            r#"{"a":"x","b":"","c":null,"d":[],"e":0,"f":false,"g":{"k":1}}"#,
        )
        .unwrap();

        assert!(claims.has_claim("a"));
        assert!(!claims.has_claim("b"));
        assert!(!claims.has_claim("c"));
        assert!(!claims.has_claim("d"));
        assert!(claims.has_claim("e"));
        assert!(claims.has_claim("f"));
        assert!(claims.has_claim("g"));
        assert!(!claims.has_claim("missing"));
    }

    #[test]
    fn test_string_exp_is_rejected() {
        let result = serde_json::from_str::<AssertionClaims>(r#"{"exp":"tomorrow"}"#);
        assert!(result.is_err());
    }
}
