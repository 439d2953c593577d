use serde::{Deserialize, Serialize};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::Response;

/// 生物数据源的基础地址，按 `{API_BASE}/{id}` 请求单只生物。
pub const API_BASE: &str = "https://pokeapi.co/api/v2/pokemon";

/// 数据源返回的生物摘要：展示名 + 正面图片（可能缺失）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatureSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ProviderError {
    NotFound { id: u32 },
    Network { message: String },
    Decode { message: String },
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::NotFound { id } => write!(f, "creature {id} not found"),
            ProviderError::Network { message } => write!(f, "network error: {message}"),
            ProviderError::Decode { message } => write!(f, "malformed response: {message}"),
        }
    }
}

impl ProviderError {
    /// 从 JS 侧的拒绝值还原类型化错误，无法还原时退化为网络错误。
    pub fn from_js(value: JsValue) -> Self {
        serde_wasm_bindgen::from_value(value.clone()).unwrap_or_else(|_| ProviderError::Network {
            message: js_message(&value),
        })
    }
}

// 数据源的原始响应体，只保留用到的字段。
#[derive(Deserialize)]
struct CreatureBody {
    name: String,
    sprites: SpriteSet,
}

#[derive(Deserialize)]
struct SpriteSet {
    front_default: Option<String>,
}

pub fn decode_summary(body: &str) -> Result<CreatureSummary, ProviderError> {
    let body: CreatureBody = serde_json::from_str(body).map_err(|err| ProviderError::Decode {
        message: err.to_string(),
    })?;
    Ok(CreatureSummary {
        name: body.name,
        sprite: body.sprites.front_default,
    })
}

/// 按 id 拉取一只生物的展示名与图片。
pub async fn fetch_creature(base_url: &str, id: u32) -> Result<CreatureSummary, ProviderError> {
    let window = web_sys::window().ok_or_else(|| ProviderError::Network {
        message: "no window object".to_string(),
    })?;
    let url = format!("{base_url}/{id}");

    let response_value = JsFuture::from(window.fetch_with_str(&url))
        .await
        .map_err(|err| ProviderError::Network {
            message: js_message(&err),
        })?;
    let response: Response = response_value.dyn_into().map_err(|_| ProviderError::Network {
        message: "fetch did not yield a Response".to_string(),
    })?;

    if response.status() == 404 {
        return Err(ProviderError::NotFound { id });
    }
    if !response.ok() {
        return Err(ProviderError::Network {
            message: format!("unexpected status {}", response.status()),
        });
    }

    let text_promise = response.text().map_err(|err| ProviderError::Network {
        message: js_message(&err),
    })?;
    let text_value = JsFuture::from(text_promise)
        .await
        .map_err(|err| ProviderError::Network {
            message: js_message(&err),
        })?;
    let body = text_value.as_string().ok_or_else(|| ProviderError::Decode {
        message: "response body is not text".to_string(),
    })?;

    decode_summary(&body)
}

fn js_message(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_extracts_name_and_front_sprite() {
        let body = r#"{
            "name": "pikachu",
            "base_experience": 112,
            "sprites": {
                "back_default": "https://sprites.example/back/25.png",
                "front_default": "https://sprites.example/25.png"
            }
        }"#;

        let summary = decode_summary(body).expect("body should decode");
        assert_eq!(summary.name, "pikachu");
        assert_eq!(
            summary.sprite.as_deref(),
            Some("https://sprites.example/25.png")
        );
    }

    #[test]
    fn decode_tolerates_missing_sprite() {
        let body = r#"{"name": "porygon", "sprites": {"front_default": null}}"#;
        let summary = decode_summary(body).expect("body should decode");
        assert_eq!(summary.name, "porygon");
        assert!(summary.sprite.is_none());
    }

    #[test]
    fn decode_rejects_malformed_bodies() {
        let result = decode_summary("not json at all");
        assert!(matches!(result, Err(ProviderError::Decode { .. })));
    }

    #[test]
    fn provider_errors_render_readable_messages() {
        let not_found = ProviderError::NotFound { id: 152 };
        assert_eq!(not_found.to_string(), "creature 152 not found");

        let network = ProviderError::Network {
            message: "unexpected status 500".to_string(),
        };
        assert!(network.to_string().contains("unexpected status 500"));
    }
}
