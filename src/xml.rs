//! Flat XML documents used by the payment endpoints.
//!
//! The platform exchanges `<xml><key>value</key>...</xml>` documents. Decoding
//! turns the root's children into a JSON object so the envelope can treat XML
//! and JSON payloads alike.

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

use crate::error::WechatError;

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Map::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> Value {
        if self.children.is_empty() {
            Value::String(self.text)
        } else {
            Value::Object(self.children)
        }
    }
}

fn insert_child(parent: &mut Map<String, Value>, name: String, value: Value) {
    match parent.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

fn write_err<E: std::fmt::Display>(e: E) -> WechatError {
    WechatError::decode(format!("XML encode failed: {e}"))
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Decode an XML document into a JSON value rooted at the document element's children.
pub fn decode(bytes: &[u8]) -> Result<Value, WechatError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| WechatError::decode(format!("XML body is not UTF-8: {e}")))?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| WechatError::decode(format!("malformed XML: {e}")))?;
        match event {
            Event::Start(start) => {
                stack.push(Frame::new(element_name(start.name().as_ref())));
            }
            Event::Empty(start) => {
                let name = element_name(start.name().as_ref());
                match stack.last_mut() {
                    Some(parent) => {
                        insert_child(&mut parent.children, name, Value::String(String::new()))
                    }
                    None => root = Some(Value::Object(Map::new())),
                }
            }
            Event::Text(content) => {
                let unescaped = content
                    .unescape()
                    .map_err(|e| WechatError::decode(format!("malformed XML text: {e}")))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&unescaped);
                }
            }
            Event::CData(content) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&content));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| WechatError::decode("unbalanced XML end tag"))?;
                let name = frame.name.clone();
                let value = frame.into_value();
                match stack.last_mut() {
                    Some(parent) => insert_child(&mut parent.children, name, value),
                    None => root = Some(value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(WechatError::decode("XML document ended inside an element"));
    }

    match root {
        Some(Value::Object(map)) => Ok(Value::Object(map)),
        Some(Value::String(text)) if text.is_empty() => Ok(Value::Object(Map::new())),
        Some(_) => Err(WechatError::decode("XML root element carries no fields")),
        None => Err(WechatError::decode("empty XML document")),
    }
}

/// Encode flat key/value pairs as `<xml><k><![CDATA[v]]></k>...</xml>`.
pub fn encode<'a, I>(fields: I) -> Result<String, WechatError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new("xml")))
        .map_err(write_err)?;
    for (key, value) in fields {
        writer
            .write_event(Event::Start(BytesStart::new(key)))
            .map_err(write_err)?;
        writer
            .write_event(Event::CData(BytesCData::new(value)))
            .map_err(write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new(key)))
            .map_err(write_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("xml")))
        .map_err(write_err)?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| WechatError::decode(format!("XML encode produced invalid UTF-8: {e}")))
}
