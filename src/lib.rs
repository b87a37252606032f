// 播放控制核心库：解复用读取、解码管线、音视频同步与刷新调度。
// 解码/解封装/渲染/重采样本体由外部实现（见 player::backend 中的 trait 定义）。

pub mod core;
pub mod player;

pub use crate::core::{
    AudioFrame, AudioSpec, Clock, EventSink, MediaInfo, PlaybackState, PlayerError, PlayerEvent,
    Result, StreamInfo, StreamKind, SubtitleFrame, SyncMaster, VideoFrame,
};
pub use crate::player::{
    AudioDecode, AudioPumpHandle, Demuxer, MediaBackend, Packet, PlaybackController,
    SampleConverter, SubtitleDecode, VideoDecode, VideoOutput,
};
