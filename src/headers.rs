//! SOAP header construction.
//!
//! Two header kinds are supported: a WS-Security UsernameToken carrying a
//! password digest, and generic named headers whose body comes from
//! configuration. Both render to XML for transports that build envelopes
//! themselves.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rand::RngCore;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::config::{HeaderKind, HeaderSpec};
use crate::error::{GatewayError, Result};

/// SOAP namespace URIs.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const PASSWORD_DIGEST_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
pub const BASE64_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

const NONCE_LEN: usize = 16;

/// A header sent with every call.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapHeader {
    Generic(GenericHeader),
    Security(UsernameToken),
}

impl SoapHeader {
    pub fn namespace(&self) -> &str {
        match self {
            Self::Generic(header) => &header.namespace,
            Self::Security(_) => WSSE_NS,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Generic(header) => &header.name,
            Self::Security(_) => "Security",
        }
    }

    pub fn must_understand(&self) -> bool {
        match self {
            Self::Generic(header) => header.must_understand,
            Self::Security(_) => true,
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        match self {
            Self::Generic(header) => header.to_xml(),
            Self::Security(token) => token.to_xml(),
        }
    }
}

/// A plain named header with a structured body.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericHeader {
    pub namespace: String,
    pub name: String,
    pub data: Map<String, Value>,
    pub must_understand: bool,
    pub actor: Option<String>,
}

impl GenericHeader {
    pub fn to_xml(&self) -> Result<String> {
        let mut xml = XmlOut::new();
        let element = header_element(&self.name)?;

        let mut start = BytesStart::new(element.as_str());
        start.push_attribute(("xmlns:hdr", self.namespace.as_str()));
        if self.must_understand {
            start.push_attribute(("soapenv:mustUnderstand", "1"));
        }
        if let Some(actor) = &self.actor {
            start.push_attribute(("soapenv:actor", actor.as_str()));
        }
        xml.start(start)?;
        for (key, value) in &self.data {
            xml.value(&header_element(key)?, value)?;
        }
        xml.end(&element)?;
        xml.finish()
    }
}

/// WS-Security UsernameToken with a digested password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    /// `base64(sha1(nonce ++ created ++ password))`
    pub password_digest: String,
    /// Base64-encoded nonce
    pub nonce: String,
    /// RFC3339 UTC creation time
    pub created: String,
    /// Optional `wsu:Id` of the UsernameToken element
    pub token_id: Option<String>,
}

impl UsernameToken {
    /// Create a token with a fresh random nonce and the current time.
    pub fn new(username: &str, password: &str, token_id: Option<&str>) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let created = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        Self::with_nonce(username, password, &nonce, &created, token_id)
    }

    /// Create a token from a known nonce and timestamp.
    pub fn with_nonce(
        username: &str,
        password: &str,
        nonce: &[u8],
        created: &str,
        token_id: Option<&str>,
    ) -> Self {
        Self {
            username: username.to_string(),
            password_digest: password_digest(nonce, created, password),
            nonce: BASE64.encode(nonce),
            created: created.to_string(),
            token_id: token_id.map(str::to_string),
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut xml = XmlOut::new();

        let mut security = BytesStart::new("wsse:Security");
        security.push_attribute(("xmlns:wsse", WSSE_NS));
        security.push_attribute(("xmlns:wsu", WSU_NS));
        xml.start(security)?;

        let mut token = BytesStart::new("wsse:UsernameToken");
        if let Some(id) = &self.token_id {
            token.push_attribute(("wsu:Id", id.as_str()));
        }
        xml.start(token)?;

        xml.text_element(BytesStart::new("wsse:Username"), &self.username)?;

        let mut password = BytesStart::new("wsse:Password");
        password.push_attribute(("Type", PASSWORD_DIGEST_TYPE));
        xml.text_element(password, &self.password_digest)?;

        let mut nonce = BytesStart::new("wsse:Nonce");
        nonce.push_attribute(("EncodingType", BASE64_ENCODING_TYPE));
        xml.text_element(nonce, &self.nonce)?;

        xml.text_element(BytesStart::new("wsu:Created"), &self.created)?;

        xml.end("wsse:UsernameToken")?;
        xml.end("wsse:Security")?;
        xml.finish()
    }
}

/// `base64(sha1(nonce ++ created ++ password))`
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Build the headers described by configuration.
///
/// Incomplete generic specs are skipped. WSSE specs contribute a username or
/// a password; one UsernameToken is emitted once both are known.
pub fn build_headers(specs: &[HeaderSpec], token_id: Option<&str>) -> Vec<SoapHeader> {
    let mut headers = Vec::new();
    let mut username: Option<String> = None;
    let mut password: Option<String> = None;
    let mut security_emitted = false;

    for spec in specs {
        match spec.kind {
            HeaderKind::Wsse => {
                match spec.name.as_deref() {
                    Some("username") => username = spec.data_text(),
                    Some("password") => password = spec.data_text(),
                    other => debug!(name = ?other, "Ignoring WSSE header entry"),
                }
                if security_emitted {
                    continue;
                }
                if let (Some(user), Some(pass)) = (&username, &password) {
                    headers.push(SoapHeader::Security(UsernameToken::new(user, pass, token_id)));
                    security_emitted = true;
                }
            }
            HeaderKind::Generic => match generic_header(spec) {
                Some(header) => headers.push(SoapHeader::Generic(header)),
                None => debug!(name = ?spec.name, "Skipping incomplete or invalid SOAP header"),
            },
        }
    }

    headers
}

fn generic_header(spec: &HeaderSpec) -> Option<GenericHeader> {
    let namespace = spec.namespace.as_deref().filter(|ns| !ns.is_empty())?;
    let name = spec.name.as_deref().filter(|n| is_ncname(n))?;
    let data = spec.data_map();
    if data.is_empty() {
        return None;
    }
    Some(GenericHeader {
        namespace: namespace.to_string(),
        name: name.to_string(),
        data,
        must_understand: spec.must_understand,
        actor: spec.actor.clone().filter(|a| !a.is_empty()),
    })
}

/// Non-colonized XML name: a letter or `_`, then letters, digits, `-`, `_` or `.`.
fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// `hdr:`-prefixed element name for a header or data key.
fn header_element(name: &str) -> Result<String> {
    if !is_ncname(name) {
        return Err(GatewayError::Xml(format!("invalid element name '{}'", name)));
    }
    Ok(format!("hdr:{}", name))
}

/// Small wrapper over the quick-xml writer.
struct XmlOut {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| GatewayError::Xml(e.to_string()))
    }

    fn start(&mut self, start: BytesStart<'_>) -> Result<()> {
        self.write(Event::Start(start))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, start: BytesStart<'_>, text: &str) -> Result<()> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        self.start(start)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(&name)
    }

    fn value(&mut self, name: &str, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write(Event::Empty(BytesStart::new(name))),
            Value::Array(items) => items.iter().try_for_each(|item| self.value(name, item)),
            Value::Object(map) => {
                self.start(BytesStart::new(name))?;
                for (key, child) in map {
                    self.value(&header_element(key)?, child)?;
                }
                self.end(name)
            }
            Value::String(s) => self.text_element(BytesStart::new(name), s),
            other => self.text_element(BytesStart::new(name), &other.to_string()),
        }
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| GatewayError::Xml(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::Reader;
    use serde_json::json;

    fn spec(kind: HeaderKind, namespace: Option<&str>, name: Option<&str>, data: Value) -> HeaderSpec {
        HeaderSpec {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.map(str::to_string),
            data: Some(data),
            must_understand: false,
            actor: None,
        }
    }

    /// Collect `(element name, text)` pairs from an XML document.
    fn texts(xml: &str) -> Vec<(String, String)> {
        let mut reader = Reader::from_str(xml);
        let mut current = String::new();
        let mut out = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => current = String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                Event::Text(t) => out.push((current.clone(), t.unescape().unwrap().into_owned())),
                Event::Eof => break,
                _ => {}
            }
        }
        out
    }

    #[test]
    fn test_password_digest_matches_independent_computation() {
        let nonce = b"0123456789abcdef";
        let created = "2024-05-01T12:00:00Z";
        let token = UsernameToken::with_nonce("alice", "s3cret", nonce, created, None);

        let mut input = Vec::new();
        input.extend_from_slice(nonce);
        input.extend_from_slice(created.as_bytes());
        input.extend_from_slice(b"s3cret");
        let expected = BASE64.encode(Sha1::digest(&input));

        assert_eq!(token.password_digest, expected);
        assert_eq!(token.nonce, BASE64.encode(nonce));
        assert_eq!(token.created, created);
    }

    #[test]
    fn test_username_token_xml() {
        let token = UsernameToken::with_nonce("alice", "pw", b"nonce", "2024-05-01T12:00:00Z", Some("UsernameToken-1"));
        let xml = token.to_xml().unwrap();

        assert!(xml.starts_with("<wsse:Security"));
        assert!(xml.contains(WSSE_NS));
        assert!(xml.contains(r#"wsu:Id="UsernameToken-1""#));
        assert!(xml.contains(PASSWORD_DIGEST_TYPE));
        assert!(xml.contains(BASE64_ENCODING_TYPE));

        let texts = texts(&xml);
        assert!(texts.contains(&("wsse:Username".to_string(), "alice".to_string())));
        assert!(texts.contains(&("wsse:Password".to_string(), token.password_digest.clone())));
        assert!(texts.contains(&("wsse:Nonce".to_string(), token.nonce.clone())));
        assert!(texts.contains(&("wsu:Created".to_string(), "2024-05-01T12:00:00Z".to_string())));
    }

    #[test]
    fn test_random_tokens_differ() {
        let a = UsernameToken::new("bob", "pw", None);
        let b = UsernameToken::new("bob", "pw", None);
        assert_ne!(a.nonce, b.nonce);
        assert!(chrono::DateTime::parse_from_rfc3339(&a.created).is_ok());
        assert!(!a.to_xml().unwrap().contains("wsu:Id"));
    }

    #[test]
    fn test_generic_header_from_json_string() {
        let mut s = spec(
            HeaderKind::Generic,
            Some("urn:example:auth"),
            Some("AuthHeader"),
            json!(r#"{"ApiKey": "abc", "Scopes": ["read", "write"]}"#),
        );
        s.must_understand = true;
        s.actor = Some("urn:actor".to_string());

        let headers = build_headers(&[s], None);
        assert_eq!(headers.len(), 1);
        let header = &headers[0];
        assert_eq!(header.name(), "AuthHeader");
        assert_eq!(header.namespace(), "urn:example:auth");
        assert!(header.must_understand());

        let xml = header.to_xml().unwrap();
        assert!(xml.contains(r#"xmlns:hdr="urn:example:auth""#));
        assert!(xml.contains(r#"soapenv:mustUnderstand="1""#));
        assert!(xml.contains(r#"soapenv:actor="urn:actor""#));
        assert!(xml.contains("<hdr:ApiKey>abc</hdr:ApiKey>"));
        assert!(xml.contains("<hdr:Scopes>read</hdr:Scopes><hdr:Scopes>write</hdr:Scopes>"));
    }

    #[test]
    fn test_incomplete_generic_headers_are_skipped() {
        let specs = [
            spec(HeaderKind::Generic, None, Some("A"), json!({"k": 1})),
            spec(HeaderKind::Generic, Some("urn:x"), None, json!({"k": 1})),
            spec(HeaderKind::Generic, Some("urn:x"), Some("C"), json!("{}")),
            spec(HeaderKind::Generic, Some("urn:x"), Some("D"), json!("not json")),
            spec(HeaderKind::Generic, Some("urn:x"), Some("E"), json!({"k": 1})),
        ];
        let headers = build_headers(&specs, None);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].name(), "E");
    }

    #[test]
    fn test_invalid_element_names_rejected() {
        let header = GenericHeader {
            namespace: "urn:x".to_string(),
            name: "Auth".to_string(),
            data: json!({"api key": "v"}).as_object().unwrap().clone(),
            must_understand: false,
            actor: None,
        };
        assert!(matches!(header.to_xml(), Err(GatewayError::Xml(_))));

        let nested = GenericHeader {
            data: json!({"Outer": {"a<b": 1}}).as_object().unwrap().clone(),
            ..header.clone()
        };
        assert!(matches!(nested.to_xml(), Err(GatewayError::Xml(_))));

        let renamed = GenericHeader {
            name: "x:y".to_string(),
            data: json!({"k": 1}).as_object().unwrap().clone(),
            ..header
        };
        assert!(matches!(renamed.to_xml(), Err(GatewayError::Xml(_))));

        let specs = [
            spec(HeaderKind::Generic, Some("urn:x"), Some("1st"), json!({"k": 1})),
            spec(HeaderKind::Generic, Some("urn:x"), Some("Token.v2"), json!({"_id": 1, "a-b": {"c.d": "e"}})),
        ];
        let headers = build_headers(&specs, None);
        assert_eq!(headers.len(), 1);
        let xml = headers[0].to_xml().unwrap();
        let texts = texts(&xml);
        assert!(texts.contains(&("hdr:_id".to_string(), "1".to_string())));
        assert!(texts.contains(&("hdr:c.d".to_string(), "e".to_string())));
    }

    #[test]
    fn test_wsse_entries_build_one_token() {
        let specs = [
            spec(HeaderKind::Wsse, None, Some("username"), json!("alice")),
            spec(HeaderKind::Wsse, None, Some("password"), json!("pw")),
            spec(HeaderKind::Wsse, None, Some("password"), json!("other")),
        ];
        let headers = build_headers(&specs, Some("Token-7"));
        assert_eq!(headers.len(), 1);
        match &headers[0] {
            SoapHeader::Security(token) => {
                assert_eq!(token.username, "alice");
                assert_eq!(token.token_id.as_deref(), Some("Token-7"));
            }
            other => panic!("expected security header, got {:?}", other),
        }
        assert!(headers[0].must_understand());

        let only_user = build_headers(&specs[..1], None);
        assert!(only_user.is_empty());
    }
}
