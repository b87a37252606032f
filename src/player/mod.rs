// 播放管线：读取线程 + 各流解码线程 + 刷新调度线程
//
// 线程拓扑与数据流:
//   reader ──包──> packet_queue ──> decoder ──帧──> frame_queue
//                                                    │
//   refresh <── pictq/subpq ─────────────────────────┤
//   设备回调 <── sampq (audio pump 拉取) ─────────────┘

pub mod audio;
pub mod backend;
pub mod controller;
pub mod decoder;
pub mod frame_queue;
pub mod packet_queue;
pub mod reader;
pub mod refresh;
pub mod state;

#[cfg(feature = "cpal-output")]
pub mod audio_device;

pub use audio::{AudioPump, AudioPumpHandle};
pub use backend::{
    AudioDecode, DecodedAudio, DecodedSubtitle, DecodedVideo, Demuxer, MediaBackend, Packet,
    SampleConverter, SubtitleDecode, VideoDecode, VideoOutput,
};
pub use controller::PlaybackController;
pub use frame_queue::{FrameQueue, FrameTiming, QueuedFrame};
pub use packet_queue::{PacketPop, PacketQueue};
pub use refresh::Refresher;
pub use state::VideoState;

#[cfg(feature = "cpal-output")]
pub use audio_device::CpalAudioOutput;
