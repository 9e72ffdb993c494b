use crate::error::GatewayError;
use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FormPart {
    fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            filename: None,
            content_type: None,
            data: Bytes::copy_from_slice(value.as_bytes()),
        }
    }

    fn is_text(&self) -> bool {
        self.filename.is_none()
    }
}

/// Inbound request body, either a JSON object or multipart form data.
///
/// Field access works the same on both so adaptation code never branches on
/// the representation. Form fields are read as text.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Map<String, Value>),
    Form(Vec<FormPart>),
}

impl RequestBody {
    /// Read the body of an inbound request.
    ///
    /// Multipart is only accepted when `allow_form` is set; an empty JSON body
    /// reads as an empty object.
    pub async fn from_request(req: Request<Body>, allow_form: bool) -> Result<Self, GatewayError> {
        if is_multipart(&req) {
            if !allow_form {
                return Err(GatewayError::FormDataNotAllowed);
            }
            let multipart = Multipart::from_request(req, &())
                .await
                .map_err(|e| GatewayError::InvalidBody(e.body_text()))?;
            return read_form(multipart).await.map(Self::Form);
        }

        let bytes = Bytes::from_request(req, &())
            .await
            .map_err(|e| GatewayError::InvalidBody(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::Json(Map::new()));
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(Self::Json(map)),
            Ok(_) => Err(GatewayError::InvalidBody("expected a JSON object".to_string())),
            Err(e) => Err(GatewayError::InvalidBody(e.to_string())),
        }
    }

    pub fn is_form(&self) -> bool {
        matches!(self, Self::Form(_))
    }

    pub fn contains(&self, field: &str) -> bool {
        match self {
            Self::Json(map) => map.contains_key(field),
            Self::Form(parts) => parts.iter().any(|p| p.name == field),
        }
    }

    /// String value of `field`; non-string JSON values read as `None`.
    pub fn get_str(&self, field: &str) -> Option<String> {
        match self {
            Self::Json(map) => map.get(field).and_then(Value::as_str).map(str::to_string),
            Self::Form(parts) => parts
                .iter()
                .find(|p| p.name == field && p.is_text())
                .and_then(|p| std::str::from_utf8(&p.data).ok())
                .map(str::to_string),
        }
    }

    pub fn get_value(&self, field: &str) -> Option<Value> {
        match self {
            Self::Json(map) => map.get(field).cloned(),
            Self::Form(_) => self.get_str(field).map(Value::String),
        }
    }

    /// Set `field` to a string, replacing every existing occurrence.
    pub fn set_str(&mut self, field: &str, value: &str) {
        match self {
            Self::Json(map) => {
                map.insert(field.to_string(), Value::String(value.to_string()));
            }
            Self::Form(parts) => match parts.iter().position(|p| p.name == field) {
                Some(first) => {
                    parts[first] = FormPart::text(field, value);
                    let mut i = 0;
                    parts.retain(|p| {
                        let keep = i <= first || p.name != field;
                        i += 1;
                        keep
                    });
                }
                None => parts.push(FormPart::text(field, value)),
            },
        }
    }

    pub fn remove(&mut self, field: &str) {
        match self {
            Self::Json(map) => {
                map.remove(field);
            }
            Self::Form(parts) => parts.retain(|p| p.name != field),
        }
    }

    /// Attach this body to an outbound request. Called once per attempt; a
    /// multipart form cannot be reused after it is sent.
    pub fn attach(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Json(map) => builder.json(map),
            Self::Form(parts) => {
                let form = parts.iter().fold(reqwest::multipart::Form::new(), |form, part| {
                    form.part(part.name.clone(), to_reqwest_part(part))
                });
                builder.multipart(form)
            }
        }
    }
}

fn to_reqwest_part(part: &FormPart) -> reqwest::multipart::Part {
    let build = || {
        let len = part.data.len() as u64;
        let mut p = reqwest::multipart::Part::stream_with_length(part.data.clone(), len);
        if let Some(filename) = &part.filename {
            p = p.file_name(filename.clone());
        }
        p
    };
    match &part.content_type {
        Some(mime) => build().mime_str(mime).unwrap_or_else(|_| build()),
        None => build(),
    }
}

fn is_multipart(req: &Request<Body>) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn read_form(mut multipart: Multipart) -> Result<Vec<FormPart>, GatewayError> {
    let mut parts = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(GatewayError::InvalidBody(e.body_text())),
        };
        let name = field.name().unwrap_or("").to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| {
                GatewayError::InvalidBody(format!(
                    "Failed to read form field '{}': {}",
                    name,
                    e.body_text()
                ))
            })?;
        parts.push(FormPart {
            name,
            filename,
            content_type,
            data,
        });
    }
    Ok(parts)
}
