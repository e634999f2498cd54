use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which base URL a probe is issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Backend,
    Frontend,
}

/// One named HTTP request definition used to exercise the service under test.
#[derive(Debug, Clone)]
pub struct NamedProbe {
    pub name: String,
    pub method: HttpMethod,
    pub target: Target,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Role whose memoized bearer token must be attached before the call.
    pub role: Option<String>,
    /// Top-level fields the JSON response body must carry on success.
    pub expect_fields: Vec<String>,
}

impl NamedProbe {
    pub fn get(name: &str, path: &str) -> Self {
        Self::new(name, HttpMethod::Get, path)
    }

    pub fn post(name: &str, path: &str, body: serde_json::Value) -> Self {
        let mut probe = Self::new(name, HttpMethod::Post, path);
        probe.body = Some(body);
        probe
    }

    fn new(name: &str, method: HttpMethod, path: &str) -> Self {
        Self {
            name: name.to_string(),
            method,
            target: Target::Backend,
            path: path.to_string(),
            body: None,
            role: None,
            expect_fields: Vec::new(),
        }
    }

    pub fn on_frontend(mut self) -> Self {
        self.target = Target::Frontend;
        self
    }

    pub fn as_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn expect_field(mut self, field: &str) -> Self {
        self.expect_fields.push(field.to_string());
        self
    }
}
