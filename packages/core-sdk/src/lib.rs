pub mod catalog;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod router;
pub mod server;
pub mod store;
pub mod stream;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用类型。
 */
pub mod prelude {
    pub use crate::config::{HttpSettings, ServerSettings};
    pub use crate::error::{GatewayError, Result};
    pub use crate::models::{
        ChatRequest, ChatResponse, ConnectionReport, Message, ModelCatalog, ModelInfo,
        ProviderConfig, Role, StreamEvent, Usage,
    };
    pub use crate::router::{Gateway, ProviderKind};
    pub use crate::store::{ConfigStore, MemoryStore};
    pub use crate::stream::EventStream;
}
