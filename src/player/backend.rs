// 外部协作者接口：解封装、解码、重采样、视频输出都由实现方提供，
// 核心只负责排队、同步与调度。

use crate::core::{AudioFrame, AudioSpec, Result, StreamInfo, SubtitleFrame, VideoFrame};

/// 压缩数据包（负载对核心不透明，时间已折算为秒）
#[derive(Debug, Clone)]
pub struct Packet {
    pub stream_index: usize,
    /// 显示时间戳（秒）；容器未给出时为 None
    pub pts: Option<f64>,
    /// 包时长（秒），未知为 0
    pub duration: f64,
    /// 容器内字节偏移
    pub pos: i64,
    pub data: Vec<u8>,
}

impl Packet {
    /// 入队统计用的字节大小
    pub fn size(&self) -> usize {
        self.data.len() + std::mem::size_of::<Self>()
    }
}

/// 解封装器：核心从这里拿流元数据和数据包
pub trait Demuxer: Send {
    fn streams(&self) -> Vec<StreamInfo>;

    /// 总时长（秒），未知为 0
    fn duration(&self) -> f64;

    /// 实时源（直播流）不参与"播放完毕即停止"判定
    fn is_realtime(&self) -> bool {
        false
    }

    /// 读取下一个包；Ok(None) 表示 EOF
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// 定位到目标时间（秒）；backward 表示向前找关键帧
    fn seek(&mut self, target: f64, backward: bool) -> Result<()>;
}

/// 解码出的视频帧及其时间戳（解码器未给出 pts 时为 None，由管线回退推算）
pub struct DecodedVideo {
    pub frame: VideoFrame,
    pub pts: Option<f64>,
}

pub struct DecodedAudio {
    pub frame: AudioFrame,
    pub pts: Option<f64>,
}

pub struct DecodedSubtitle {
    pub frame: SubtitleFrame,
    pub pts: Option<f64>,
    /// 字幕显示时长（秒）
    pub duration: f64,
}

/// 视频解码原语：decode 返回 0~n 帧（内部缓冲造成的 need_more_input 即空 Vec）
pub trait VideoDecode: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedVideo>>;
    /// 丢弃内部缓冲（seek 后序列切换时调用）
    fn flush(&mut self);
    /// EOF 时取出仍在缓冲中的帧
    fn drain(&mut self) -> Result<Vec<DecodedVideo>>;
}

pub trait AudioDecode: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedAudio>>;
    fn flush(&mut self);
    fn drain(&mut self) -> Result<Vec<DecodedAudio>>;
}

pub trait SubtitleDecode: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedSubtitle>>;
    fn flush(&mut self);
}

/// 重采样/拉伸原语：核心只计算需要多少补偿采样，具体重采样由实现方完成
///
/// 返回按输出参数交织的 f32 数据，每声道 `wanted_nb_samples` 个采样。
pub trait SampleConverter: Send {
    fn convert(&mut self, frame: &AudioFrame, wanted_nb_samples: usize) -> Vec<f32>;
}

/// 视频输出：刷新调度器决定"现在显示这一帧"后调用
pub trait VideoOutput: Send {
    fn request_display(&mut self, frame: &VideoFrame, subtitle: Option<&SubtitleFrame>);
}

/// 媒体后端工厂：打开解封装器、各类型解码器与音频输出
pub trait MediaBackend: Send {
    fn open(&mut self, url: &str) -> Result<Box<dyn Demuxer>>;

    fn open_video_decoder(&mut self, stream: &StreamInfo) -> Result<Box<dyn VideoDecode>>;

    fn open_audio_decoder(&mut self, stream: &StreamInfo) -> Result<Box<dyn AudioDecode>>;

    fn open_subtitle_decoder(&mut self, stream: &StreamInfo) -> Result<Box<dyn SubtitleDecode>>;

    /// 协商音频输出参数，返回实际参数与对应的重采样器
    fn open_audio_output(
        &mut self,
        wanted: AudioSpec,
    ) -> Result<(AudioSpec, Box<dyn SampleConverter>)>;
}
