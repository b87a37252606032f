use serde::{Deserialize, Serialize};

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    RGB,
    YUV420P,
    NV12,
}

/// 音频采样格式（核心内部统一使用 f32 交织数据）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
}

/// 有理数（流的 time_base、帧率、宽高比等元数据）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

/// 视频帧数据
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// 显示宽高比，用于外部计算显示矩形
    pub sample_aspect_ratio: Rational,
    pub data: Vec<u8>, // CPU 内存数据
}

/// 音频帧数据
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub data: Vec<f32>, // 交织采样，统一 f32 格式
}

impl AudioFrame {
    /// 每声道采样数
    pub fn nb_samples(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels as usize
        }
    }
}

/// 字幕帧数据
#[derive(Debug, Clone)]
pub struct SubtitleFrame {
    pub text: String,
}

/// 流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
    Subtitle,
}

/// 流元数据（由外部解封装器提供）
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub codec_name: String,
    pub time_base: Rational,
    pub bit_rate: i64,
    // 视频相关
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub sample_aspect_ratio: Rational,
    // 音频相关
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamInfo {
    pub fn new(index: usize, kind: StreamKind) -> Self {
        Self {
            index,
            kind,
            codec_name: String::new(),
            time_base: Rational::new(1, 1000),
            bit_rate: 0,
            width: 0,
            height: 0,
            frame_rate: Rational::new(0, 1),
            sample_aspect_ratio: Rational::new(1, 1),
            sample_rate: 0,
            channels: 0,
        }
    }
}

/// 音频输出参数（期望/协商结果）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// 设备单次回调的每声道采样数（决定同步修正的最小粒度）
    pub buffer_samples: usize,
}

impl AudioSpec {
    /// 每秒字节数（f32 交织）
    pub fn bytes_per_sec(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * std::mem::size_of::<f32>()
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Opening,
    Playing,
    Paused,
    Stopping,
}

/// 主同步时钟选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMaster {
    Audio,
    Video,
    External,
}

/// 媒体信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64, // 总时长（秒），未知为 0
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            width: 0,
            height: 0,
            fps: 0.0,
            video_codec: String::new(),
            audio_codec: String::new(),
            sample_rate: 0,
            channels: 0,
        }
    }
}
