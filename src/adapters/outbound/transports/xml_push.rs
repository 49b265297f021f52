//! XML-RPC Push Client
//!
//! Pushes posts to a WordPress-style XML-RPC endpoint (`wp.newPost`,
//! `wp.editPost`, `wp.deletePost`). Credentials: `username`, `password` and
//! optionally `blog_id` (defaults to 0).

use super::http::{self, malformed};
use super::xml::{parse_document, XmlNode};
use crate::domain::entities::{ContentItem, DeliveryFailure, DeliveryResult, Endpoint};
use crate::domain::ports::TransportClient;
use crate::domain::value_objects::{ErrorKind, TransportType};
use crate::error::ConfigurationError;
use async_trait::async_trait;
use quick_xml::escape::escape;
use std::collections::BTreeMap;

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcValue {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Struct(BTreeMap<String, XmlRpcValue>),
    Array(Vec<XmlRpcValue>),
    Nil,
}

impl XmlRpcValue {
    fn str(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    fn write(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Self::String(s) => out.push_str(&format!("<string>{}</string>", escape(s.as_str()))),
            Self::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
            Self::Bool(b) => out.push_str(&format!("<boolean>{}</boolean>", u8::from(*b))),
            Self::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
            Self::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str(&format!("<member><name>{}</name>", escape(name.as_str())));
                    value.write(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Self::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write(out);
                }
                out.push_str("</data></array>");
            }
            Self::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }

    fn from_node(value: &XmlNode) -> Result<Self, String> {
        let Some(typed) = value.children.first() else {
            return Ok(Self::String(value.text.clone()));
        };
        let text = typed.text.trim();
        match typed.name.as_str() {
            "string" | "dateTime.iso8601" | "base64" => Ok(Self::String(typed.text.clone())),
            "int" | "i4" | "i8" => text
                .parse()
                .map(Self::Int)
                .map_err(|_| format!("bad integer {:?}", text)),
            "boolean" => Ok(Self::Bool(text == "1")),
            "double" => text
                .parse()
                .map(Self::Double)
                .map_err(|_| format!("bad double {:?}", text)),
            "nil" => Ok(Self::Nil),
            "struct" => {
                let mut members = BTreeMap::new();
                for member in typed.children("member") {
                    let name = member.child("name").map(|n| n.text.clone()).ok_or("member without name")?;
                    let value = member.child("value").ok_or("member without value")?;
                    members.insert(name, Self::from_node(value)?);
                }
                Ok(Self::Struct(members))
            }
            "array" => {
                let data = typed.child("data").ok_or("array without data")?;
                data.children("value")
                    .map(Self::from_node)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::Array)
            }
            other => Err(format!("unknown value type {}", other)),
        }
    }

    /// Scalar rendered as a remote id.
    fn as_id(&self) -> Option<String> {
        match self {
            Self::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Self::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

/// Decoded `methodResponse`.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcResponse {
    Success(XmlRpcValue),
    Fault { code: i64, message: String },
}

/// Serialize a `methodCall` document.
pub fn method_call(method: &str, params: &[XmlRpcValue]) -> String {
    let mut out = String::from(r#"<?xml version="1.0"?><methodCall>"#);
    out.push_str(&format!("<methodName>{}</methodName><params>", escape(method)));
    for param in params {
        out.push_str("<param>");
        param.write(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Parse a `methodResponse` document.
pub fn parse_response(xml: &str) -> Result<XmlRpcResponse, String> {
    let root = parse_document(xml)?;
    if root.name != "methodResponse" {
        return Err(format!("expected methodResponse, found {}", root.name));
    }

    if let Some(fault) = root.child("fault") {
        let value = fault.child("value").ok_or("fault without value")?;
        let XmlRpcValue::Struct(members) = XmlRpcValue::from_node(value)? else {
            return Err("fault value is not a struct".to_string());
        };
        let code = match members.get("faultCode") {
            Some(XmlRpcValue::Int(code)) => *code,
            _ => 0,
        };
        let message = match members.get("faultString") {
            Some(XmlRpcValue::String(s)) => s.clone(),
            _ => String::new(),
        };
        return Ok(XmlRpcResponse::Fault { code, message });
    }

    let value = root
        .child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .ok_or("response without params")?;
    XmlRpcValue::from_node(value).map(XmlRpcResponse::Success)
}

/// Transport client for XML-RPC push endpoints.
pub struct XmlPushClient {
    http: reqwest::Client,
}

impl XmlPushClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn auth_params(endpoint: &Endpoint) -> Result<Vec<XmlRpcValue>, ConfigurationError> {
        let username = http::require(endpoint, "username")?;
        let password = http::require(endpoint, "password")?;
        let blog_id = endpoint
            .credentials
            .get("blog_id")
            .and_then(|b| b.parse().ok())
            .unwrap_or(0);
        Ok(vec![
            XmlRpcValue::Int(blog_id),
            XmlRpcValue::str(username),
            XmlRpcValue::str(password),
        ])
    }

    fn post_struct(item: &ContentItem) -> XmlRpcValue {
        let mut post = BTreeMap::new();
        post.insert("post_title".to_string(), XmlRpcValue::str(&item.title));
        post.insert("post_content".to_string(), XmlRpcValue::str(&item.body));
        post.insert("post_status".to_string(), XmlRpcValue::str("publish"));
        post.insert(
            "post_date_gmt".to_string(),
            XmlRpcValue::str(item.created_at.format("%Y%m%dT%H:%M:%S").to_string()),
        );

        if !item.taxonomy.is_empty() {
            let terms = item
                .taxonomy
                .iter()
                .map(|(tax, names)| {
                    (
                        tax.clone(),
                        XmlRpcValue::Array(names.iter().map(XmlRpcValue::str).collect()),
                    )
                })
                .collect();
            post.insert("terms_names".to_string(), XmlRpcValue::Struct(terms));
        }
        XmlRpcValue::Struct(post)
    }

    /// Perform one call; ordinary failures come back as `DeliveryFailure`.
    async fn call(&self, url: &str, method: &str, params: &[XmlRpcValue]) -> Result<XmlRpcValue, DeliveryFailure> {
        let request = self
            .http
            .post(url)
            .header("content-type", "text/xml")
            .body(method_call(method, params));
        let body = http::send(request).await?;

        match parse_response(&body).map_err(|e| malformed(format!("{}: {}", method, e)))? {
            XmlRpcResponse::Success(value) => Ok(value),
            XmlRpcResponse::Fault { code, message } => Err(DeliveryFailure {
                kind: ErrorKind::RemoteFault { code },
                message: format!("{} fault {}: {}", method, code, message),
            }),
        }
    }
}

#[async_trait]
impl TransportClient for XmlPushClient {
    fn transport_type(&self) -> TransportType {
        TransportType::XmlPush
    }

    async fn push(
        &self,
        item: &ContentItem,
        endpoint: &Endpoint,
        remote_id: Option<&str>,
    ) -> Result<DeliveryResult, ConfigurationError> {
        let url = http::base_url(endpoint)?;
        let mut params = Self::auth_params(endpoint)?;

        let result = match remote_id {
            Some(id) => {
                params.push(XmlRpcValue::str(id));
                params.push(Self::post_struct(item));
                self.call(&url, "wp.editPost", &params).await.and_then(|v| match v {
                    XmlRpcValue::Bool(true) => Ok(id.to_string()),
                    other => Err(malformed(format!("wp.editPost returned {:?}", other))),
                })
            }
            None => {
                params.push(Self::post_struct(item));
                self.call(&url, "wp.newPost", &params)
                    .await
                    .and_then(|v| v.as_id().ok_or_else(|| malformed("wp.newPost returned no post id")))
            }
        };

        Ok(match result {
            Ok(id) => DeliveryResult::ok(Some(id)),
            Err(failure) => DeliveryResult::failed(failure.kind, failure.message),
        })
    }

    async fn delete(&self, remote_id: &str, endpoint: &Endpoint) -> Result<DeliveryResult, ConfigurationError> {
        let url = http::base_url(endpoint)?;
        let mut params = Self::auth_params(endpoint)?;
        params.push(XmlRpcValue::str(remote_id));

        Ok(match self.call(&url, "wp.deletePost", &params).await {
            Ok(_) => DeliveryResult::ok(None),
            Err(failure) => DeliveryResult::failed(failure.kind, failure.message),
        })
    }

    async fn test_connection(&self, endpoint: &Endpoint) -> bool {
        let (Ok(url), Ok(params)) = (http::base_url(endpoint), Self::auth_params(endpoint)) else {
            return false;
        };
        // wp.getUsersBlogs takes (username, password) only.
        let params = &params[1..];
        match self.call(&url, "wp.getUsersBlogs", params).await {
            Ok(_) => true,
            Err(failure) => {
                tracing::debug!("connection test for {} failed: {}", endpoint.id, failure.message);
                false
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_method_call_escapes_strings() {
        let xml = method_call("wp.newPost", &[XmlRpcValue::str("a <b> & c"), XmlRpcValue::Int(7)]);
        assert!(xml.contains("<methodName>wp.newPost</methodName>"));
        assert!(xml.contains("<string>a &lt;b&gt; &amp; c</string>"));
        assert!(xml.contains("<int>7</int>"));
    }

    #[test]
    fn test_method_call_round_trips_through_parser() {
        let mut members = BTreeMap::new();
        members.insert("flag".to_string(), XmlRpcValue::Bool(true));
        members.insert(
            "list".to_string(),
            XmlRpcValue::Array(vec![XmlRpcValue::str("x"), XmlRpcValue::Int(2)]),
        );
        let value = XmlRpcValue::Struct(members);

        let xml = method_call("m", &[value.clone()]);
        let root = parse_document(&xml).unwrap();
        let node = root
            .child("params")
            .and_then(|p| p.child("param"))
            .and_then(|p| p.child("value"))
            .unwrap();
        assert_eq!(XmlRpcValue::from_node(node).unwrap(), value);
    }

    #[test]
    fn test_parse_success_response() {
        let xml = r#"<?xml version="1.0"?>
            <methodResponse><params><param><value><string>123</string></value></param></params></methodResponse>"#;
        assert_eq!(
            parse_response(xml).unwrap(),
            XmlRpcResponse::Success(XmlRpcValue::str("123"))
        );
    }

    #[test]
    fn test_parse_untyped_value_is_string() {
        let xml = "<methodResponse><params><param><value>77</value></param></params></methodResponse>";
        let XmlRpcResponse::Success(value) = parse_response(xml).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(value.as_id().as_deref(), Some("77"));
    }

    #[test]
    fn test_parse_fault_response() {
        let xml = r#"<methodResponse><fault><value><struct>
            <member><name>faultCode</name><value><int>403</int></value></member>
            <member><name>faultString</name><value><string>Incorrect username or password.</string></value></member>
            </struct></value></fault></methodResponse>"#;

        assert_eq!(
            parse_response(xml).unwrap(),
            XmlRpcResponse::Fault {
                code: 403,
                message: "Incorrect username or password.".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_other_documents() {
        assert!(parse_response("<html><body>oops</body></html>").is_err());
        assert!(parse_response("<methodResponse></methodResponse>").is_err());
    }

    #[test]
    fn test_post_struct_carries_terms() {
        let item = ContentItem::new("c", "Title", "Body").with_terms("category", vec!["news".to_string()]);
        let XmlRpcValue::Struct(post) = XmlPushClient::post_struct(&item) else {
            panic!("expected struct");
        };
        assert_eq!(post["post_title"], XmlRpcValue::str("Title"));
        assert!(matches!(post["terms_names"], XmlRpcValue::Struct(_)));
    }
}
