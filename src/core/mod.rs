// 核心数据结构和类型定义

pub mod clock;
pub mod error;
pub mod events;
pub mod types;

// 重新导出常用类型
pub use types::{AudioFrame, SubtitleFrame, VideoFrame};

pub use clock::*;
pub use error::*;
pub use events::*;
pub use types::*;
