//! Compiles a sealed chain into an [`HttpRequest`].
//!
//! Path: `/` + each method name followed by its path arguments, in chain
//! order. Chain methods put every argument in the path. A terminal GET puts
//! positional scalars in the path and the rest in the query string; a terminal
//! POST sends every argument as one JSON object body. A form argument is
//! spread over one query parameter or body member per set field.

use super::transport::HttpRequest;
use crate::chain::SealedChain;
use crate::codec::encode_path_segment;
use crate::config::WireConfig;
use crate::error::Result;
use crate::interface::{ArgPlacement, HttpVerb};
use serde_json::{Map, Value as Json};

/// Compile a sealed chain.
pub fn compile(chain: &SealedChain) -> Result<HttpRequest> {
    let codec = chain.registry().codec();
    let mut segments: Vec<String> = Vec::new();
    let mut query = Vec::new();
    let mut body = Map::new();

    for invocation in chain.invocations() {
        let method = invocation.method();
        segments.push(encode_path_segment(method.name()).into_owned());

        for (param, arg) in method.params().iter().zip(invocation.args()) {
            let form = chain.registry().form_struct(&param.ty).is_some();
            match method.placement(param) {
                ArgPlacement::Path => {
                    let text = codec.to_text(arg, &param.ty)?;
                    segments.push(encode_path_segment(&text).into_owned());
                }
                ArgPlacement::Query if form => {
                    query.extend(codec.to_form(arg, &param.ty)?);
                }
                ArgPlacement::Body if form => {
                    body.extend(codec.form_members(arg, &param.ty)?);
                }
                ArgPlacement::Query => {
                    if !arg.is_null() {
                        query.push((param.name.clone(), codec.to_text(arg, &param.ty)?));
                    }
                }
                ArgPlacement::Body => {
                    body.insert(param.name.clone(), codec.encode(arg, &param.ty)?);
                }
            }
        }
    }

    let terminal = chain.terminal().method();
    let mut request = HttpRequest {
        verb: terminal.verb(),
        path: format!("/{}", segments.join("/")),
        query,
        headers: Vec::new(),
        body: None,
    };

    request.set_header("Accept", WireConfig::JSON_MIME_TYPE);
    if terminal.verb() == HttpVerb::Post {
        request.set_header("Content-Type", WireConfig::JSON_CONTENT_TYPE);
        request.body = Some(Json::Object(body).to_string());
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InvocationChain;
    use crate::interface::{InterfaceDescriptor, MethodDescriptor};
    use crate::registry::Registry;
    use crate::types::{EnumDescriptor, StructDescriptor, TypeDescriptor};
    use crate::value::{StructValue, Value};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn registry() -> Arc<Registry> {
        Registry::builder()
            .enumeration(EnumDescriptor::new("Status", ["ACTIVE", "INACTIVE"]))
            .structure(StructDescriptor::new("Filter").field("q", TypeDescriptor::String))
            .structure(
                StructDescriptor::new("Page")
                    .field("offset", TypeDescriptor::Int32)
                    .field("size", TypeDescriptor::Int32)
                    .form(),
            )
            .interface(
                InterfaceDescriptor::new("Root")
                    .method(
                        MethodDescriptor::get("a", TypeDescriptor::interface("Leaf"))
                            .param("n", TypeDescriptor::Int32)
                            .param("s", TypeDescriptor::String),
                    )
                    .method(
                        MethodDescriptor::get("find", TypeDescriptor::Void)
                            .param("status", TypeDescriptor::enumeration("Status"))
                            .param("since", TypeDescriptor::Date)
                            .named_param("limit", TypeDescriptor::Int32)
                            .param("filter", TypeDescriptor::structure("Filter")),
                    )
                    .method(
                        MethodDescriptor::post("create", TypeDescriptor::Void)
                            .param("name", TypeDescriptor::String)
                            .param("status", TypeDescriptor::enumeration("Status")),
                    )
                    .method(MethodDescriptor::post("reset", TypeDescriptor::Void))
                    .method(
                        MethodDescriptor::get("list", TypeDescriptor::Void)
                            .param("page", TypeDescriptor::structure("Page"))
                            .named_param("q", TypeDescriptor::String),
                    )
                    .method(
                        MethodDescriptor::post("scan", TypeDescriptor::Void)
                            .param("name", TypeDescriptor::String)
                            .param("page", TypeDescriptor::structure("Page")),
                    ),
            )
            .interface(
                InterfaceDescriptor::new("Leaf").method(MethodDescriptor::get("b", TypeDescriptor::Void)),
            )
            .build()
            .unwrap()
    }

    fn sealed(calls: Vec<(&str, Vec<Value>)>) -> SealedChain {
        let mut chain = InvocationChain::start(registry(), "Root").unwrap();
        for (name, args) in calls {
            chain.append_call(name, args).unwrap();
        }
        chain.seal().unwrap()
    }

    #[test]
    fn test_chain_path() {
        let request = compile(&sealed(vec![("a", vec![1.into(), "x".into()]), ("b", vec![])])).unwrap();
        assert_eq!(request.verb, HttpVerb::Get);
        assert_eq!(request.path, "/a/1/x/b");
        assert!(request.query.is_empty());
        assert!(request.body.is_none());
    }

    #[test]
    fn test_path_arguments_are_percent_encoded() {
        let request =
            compile(&sealed(vec![("a", vec![2.into(), "a b/c".into()]), ("b", vec![])])).unwrap();
        assert_eq!(request.path, "/a/2/a%20b%2Fc/b");
    }

    #[test]
    fn test_get_placement() {
        let since = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let filter = StructValue::new("Filter").with("q", "x");
        let request = compile(&sealed(vec![(
            "find",
            vec![
                Value::enumeration("active"),
                since.into(),
                10.into(),
                filter.into(),
            ],
        )]))
        .unwrap();
        assert_eq!(request.path, "/find/ACTIVE/2024-01-02T00%3A00%3A00Z");
        assert_eq!(
            request.query,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("filter".to_string(), r#"{"q":"x"}"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_null_query_arguments_omitted() {
        let since = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let request = compile(&sealed(vec![(
            "find",
            vec![Value::enumeration("ACTIVE"), since.into(), Value::Null, Value::Null],
        )]))
        .unwrap();
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_post_body() {
        let request = compile(&sealed(vec![(
            "create",
            vec!["ada".into(), Value::enumeration("INACTIVE")],
        )]))
        .unwrap();
        assert_eq!(request.verb, HttpVerb::Post);
        assert_eq!(request.path, "/create");
        assert_eq!(
            request.body.as_deref(),
            Some(r#"{"name":"ada","status":"INACTIVE"}"#)
        );
        assert_eq!(request.header("content-type"), Some(WireConfig::JSON_CONTENT_TYPE));
    }

    #[test]
    fn test_post_without_params_sends_empty_object() {
        let request = compile(&sealed(vec![("reset", vec![])])).unwrap();
        assert_eq!(request.body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_form_argument_spreads_over_query() {
        let page = StructValue::new("Page").with("offset", 20).with("size", Value::Null);
        let request = compile(&sealed(vec![("list", vec![page.into(), "x".into()])])).unwrap();
        assert_eq!(request.path, "/list");
        assert_eq!(
            request.query,
            vec![
                ("offset".to_string(), "20".to_string()),
                ("q".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_form_argument_spreads_over_body() {
        let page = StructValue::new("Page").with("offset", 0).with("size", 5);
        let request = compile(&sealed(vec![("scan", vec!["ada".into(), page.into()])])).unwrap();
        assert_eq!(
            request.body.as_deref(),
            Some(r#"{"name":"ada","offset":0,"size":5}"#)
        );

        let request = compile(&sealed(vec![("scan", vec!["ada".into(), Value::Null])])).unwrap();
        assert_eq!(request.body.as_deref(), Some(r#"{"name":"ada"}"#));
    }
}
