pub mod backend;
pub mod config;
pub mod credentials;
pub mod data_uri;
pub mod errors;
pub mod gateway;
pub mod mask;
pub mod panels;
pub mod prompts;
pub mod workspace;

use serde_json::{Map, Value};

pub use backend::{Backend, ContentPart, ContentRequest, ContentResponse, DryrunBackend, GeminiBackend};
pub use config::GatewayConfig;
pub use credentials::CredentialStatus;
pub use errors::{classify, ApiError, ApiKind, ErrorTriple};
pub use gateway::{parse_analysis, AnalysisResult, Gateway, Route};
pub use mask::{MaskCompositor, MaskStroke};
pub use panels::{AnalystPanel, CreatorPanel, EditorPanel, PanelTarget, PromptSelection, SwapperPanel};
pub use workspace::Workspace;

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
