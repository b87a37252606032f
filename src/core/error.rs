use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无法打开媒体源: {0}")]
    Open(String),

    #[error("无法找到可播放的流")]
    NoStream,

    #[error("解码错误: {0}")]
    Decode(String),

    /// 队列被中止（停止播放或 flush 时的正常退出信号，不上报给外壳）
    #[error("队列已中止")]
    QueueAborted,

    #[error("音频设备错误: {0}")]
    AudioDevice(String),

    #[error("跳转失败: {0}")]
    Seek(String),

    #[error("其他错误: {0}")]
    Other(String),

    #[error("Anyhow 错误: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
