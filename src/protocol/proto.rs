//! Service protocol structure, loading and validation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::error::ProtocolError;

/// Whether a service is a request/response API or a one-way message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Api,
    Msg,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Api => "api",
            ServiceKind::Msg => "msg",
        }
    }
}

/// One entry of a service protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDef {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    /// HTTP path relative to the server URL. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ServiceDef {
    pub fn api(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ServiceKind::Api,
            path: None,
        }
    }

    pub fn msg(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ServiceKind::Msg,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> &str {
        self.path
            .as_deref()
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(&self.name)
    }
}

/// The set of services a client may use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProto {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub services: Vec<ServiceDef>,
}

impl ServiceProto {
    pub fn new(services: Vec<ServiceDef>) -> Self {
        Self {
            version: 0,
            services,
        }
    }

    pub fn api(&self, name: &str) -> Option<&ServiceDef> {
        self.find(name, ServiceKind::Api)
    }

    pub fn msg(&self, name: &str) -> Option<&ServiceDef> {
        self.find(name, ServiceKind::Msg)
    }

    /// Like [`api`](Self::api), with a hint listing close matches when missing.
    pub fn require_api(&self, name: &str) -> Result<&ServiceDef, ProtocolError> {
        self.api(name).ok_or_else(|| {
            let known: Vec<&str> = self
                .services
                .iter()
                .filter(|s| s.kind == ServiceKind::Api)
                .map(|s| s.name.as_str())
                .filter(|n| n.eq_ignore_ascii_case(name) || n.contains(name))
                .collect();
            let err = ProtocolError::NotFound {
                name: name.to_string(),
                hint: None,
            };
            if known.is_empty() {
                err
            } else {
                err.with_hint(format!("Did you mean: {}", known.join(", ")))
            }
        })
    }

    fn find(&self, name: &str, kind: ServiceKind) -> Option<&ServiceDef> {
        self.services
            .iter()
            .find(|s| s.kind == kind && s.name == name)
    }

    /// Check structural invariants: non-empty names, unique ids, unique names per kind.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for (idx, service) in self.services.iter().enumerate() {
            if service.name.trim().is_empty() {
                return Err(ProtocolError::ValidationError(format!(
                    "services[{}].name must be non-empty",
                    idx
                )));
            }
            if !ids.insert(service.id) {
                return Err(ProtocolError::ValidationError(format!(
                    "duplicate service id {} at services[{}]",
                    service.id, idx
                )));
            }
            if !names.insert((service.kind, service.name.as_str())) {
                return Err(ProtocolError::ValidationError(format!(
                    "duplicate {:?} name '{}' at services[{}]",
                    service.kind, service.name, idx
                )));
            }
        }
        Ok(())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ProtocolError> {
        let proto: Self =
            serde_yaml::from_str(content).map_err(|e| ProtocolError::YamlError(e.to_string()))?;
        proto.validate()?;
        Ok(proto)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ProtocolError> {
        let proto: Self =
            serde_json::from_str(content).map_err(|e| ProtocolError::JsonError(e.to_string()))?;
        proto.validate()?;
        Ok(proto)
    }

    /// Load a protocol file. `.json` files are parsed as JSON, anything else as YAML.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProtocolError::LoadError {
                path: path.to_string_lossy().to_string(),
                reason: e.to_string(),
                hint: Some("Check if the file exists and you have read permissions.".to_string()),
            })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let proto = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        };

        proto.map_err(|e| ProtocolError::LoadError {
            path: path.to_string_lossy().to_string(),
            reason: e.to_string(),
            hint: None,
        })
    }
}

/// Compile-time description of one API, for typed calls.
///
/// ```rust
/// use rpcall::protocol::ApiSpec;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// struct ReqLogin { username: String }
/// #[derive(Deserialize)]
/// struct ResLogin { token: String }
///
/// struct Login;
/// impl ApiSpec for Login {
///     const NAME: &'static str = "user/Login";
///     type Req = ReqLogin;
///     type Res = ResLogin;
/// }
/// ```
pub trait ApiSpec {
    const NAME: &'static str;
    type Req: Serialize;
    type Res: DeserializeOwned + Send + 'static;
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
version: 2
services:
  - id: 0
    name: user/Login
    type: api
  - id: 1
    name: user/Logout
    type: api
    path: /auth/logout
  - id: 2
    name: chat/Notice
    type: msg
"#;

    #[test]
    fn test_parse_yaml_and_lookup() {
        let proto = ServiceProto::from_yaml_str(YAML).unwrap();
        assert_eq!(proto.version, 2);
        assert_eq!(proto.api("user/Login").unwrap().path(), "user/Login");
        assert_eq!(proto.api("user/Logout").unwrap().path(), "auth/logout");
        assert!(proto.api("chat/Notice").is_none());
        assert!(proto.msg("chat/Notice").is_some());
    }

    #[test]
    fn test_require_api_hint() {
        let proto = ServiceProto::from_yaml_str(YAML).unwrap();
        assert!(proto.require_api("user/Login").is_ok());
        let err = proto.require_api("user").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Service not found: user"));
        assert!(text.contains("user/Login, user/Logout"));
        assert!(!proto.require_api("nothing").unwrap_err().to_string().contains("Hint"));
    }

    #[test]
    fn test_parse_json() {
        let proto = ServiceProto::from_json_str(
            r#"{"services":[{"id":5,"name":"Ping","type":"api"}]}"#,
        )
        .unwrap();
        assert_eq!(proto.version, 0);
        assert_eq!(proto.api("Ping").unwrap().id, 5);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let proto = ServiceProto::new(vec![ServiceDef::api(1, "A"), ServiceDef::msg(1, "B")]);
        assert!(matches!(
            proto.validate(),
            Err(ProtocolError::ValidationError(_))
        ));
    }

    #[test]
    fn test_same_name_different_kind_allowed() {
        let proto = ServiceProto::new(vec![ServiceDef::api(1, "A"), ServiceDef::msg(2, "A")]);
        assert!(proto.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let proto = ServiceProto::new(vec![ServiceDef::api(1, "  ")]);
        assert!(proto.validate().is_err());
    }

    #[test]
    fn test_bad_yaml() {
        let err = ServiceProto::from_yaml_str("services: [").unwrap_err();
        assert!(matches!(err, ProtocolError::YamlError(_)));
    }
}
