// cpal 音频输出适配：把设备回调接到音频泵上。
// 可选功能，核心本身不依赖任何具体音频后端。

use crate::core::{AudioSpec, PlayerError, Result};
use crate::player::audio::AudioPumpHandle;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};

/// 默认输出设备上的拉取式音频流
pub struct CpalAudioOutput {
    // 流对象落地即停，必须持有
    _stream: cpal::Stream,
    spec: AudioSpec,
}

impl CpalAudioOutput {
    /// 按期望参数打开默认输出设备并立即开始拉取
    pub fn open(handle: AudioPumpHandle, wanted: AudioSpec) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioDevice("没有可用的音频输出设备".to_string()))?;
        info!(
            "打开音频设备: {} ({} Hz, {} 声道)",
            device.name().unwrap_or_else(|_| "未知设备".to_string()),
            wanted.sample_rate,
            wanted.channels
        );

        let config = cpal::StreamConfig {
            channels: wanted.channels,
            sample_rate: cpal::SampleRate(wanted.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(wanted.buffer_samples as u32),
        };
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| handle.fill(data),
                |e| warn!("音频流错误: {}", e),
                None,
            )
            .map_err(|e| PlayerError::AudioDevice(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PlayerError::AudioDevice(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            spec: wanted,
        })
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }
}
