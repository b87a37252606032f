use crate::core::{system_time, AudioSpec, SyncMaster, AV_NOSYNC_THRESHOLD};
use crate::player::backend::SampleConverter;
use crate::player::state::{
    VideoState, AUDIO_DIFF_AVG_NB, SAMPLE_CORRECTION_PERCENT_MAX,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

/// 音频泵：设备回调的拉取端
///
/// `fill` 在设备回调里执行，绝不阻塞：帧队列暂时没有数据就填静音，
/// 宁可出现可闻间隙也不能拖住音频线程。每次回调顺带把音频时钟
/// 推到"此刻喇叭正在播的位置"，并让外部时钟向它靠拢。
pub struct AudioPump {
    is: Weak<VideoState>,
    spec: AudioSpec,
    converter: Box<dyn SampleConverter>,

    // 当前已转换、待消费的交织缓冲
    buf: Vec<f32>,
    buf_index: usize,

    /// 当前缓冲末尾对应的流时间（秒）；未知为 NaN
    audio_clock: f64,
    audio_clock_serial: i32,

    // 非音频主时钟时的采样数补偿状态（指数滑动平均）
    diff_cum: f64,
    diff_avg_coef: f64,
    diff_avg_count: usize,
    diff_threshold: f64,
}

impl AudioPump {
    pub fn new(is: Weak<VideoState>, spec: AudioSpec, converter: Box<dyn SampleConverter>) -> Self {
        Self {
            is,
            spec,
            converter,
            buf: Vec::new(),
            buf_index: 0,
            audio_clock: f64::NAN,
            audio_clock_serial: -1,
            diff_cum: 0.0,
            diff_avg_coef: (0.01f64.ln() / AUDIO_DIFF_AVG_NB as f64).exp(),
            diff_avg_count: 0,
            diff_threshold: spec.buffer_samples as f64 / spec.sample_rate as f64,
        }
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// 填充一段设备缓冲（交织 f32）；不足的部分补静音
    pub fn fill(&mut self, out: &mut [f32]) {
        let callback_time = system_time();
        let Some(is) = self.is.upgrade() else {
            out.fill(0.0);
            return;
        };
        if is.paused.load(Ordering::SeqCst) || is.abort_request.load(Ordering::SeqCst) {
            out.fill(0.0);
            return;
        }

        let gain = if is.muted.load(Ordering::SeqCst) {
            0.0
        } else {
            is.volume()
        };

        let mut filled = 0;
        while filled < out.len() {
            if self.buf_index >= self.buf.len() && !self.refill(&is) {
                break;
            }
            let n = (out.len() - filled).min(self.buf.len() - self.buf_index);
            for (dst, src) in out[filled..filled + n]
                .iter_mut()
                .zip(&self.buf[self.buf_index..self.buf_index + n])
            {
                *dst = src * gain as f32;
            }
            self.buf_index += n;
            filled += n;
        }
        out[filled..].fill(0.0);

        if !self.audio_clock.is_nan() {
            // 喇叭实际播放位置 = 缓冲末尾时间 - 设备两级缓冲 - 本地未消费部分
            let pending =
                (self.buf.len() - self.buf_index) / self.spec.channels.max(1) as usize;
            let latency =
                (2 * self.spec.buffer_samples + pending) as f64 / self.spec.sample_rate as f64;
            is.audclk.set_at(
                self.audio_clock - latency,
                self.audio_clock_serial,
                callback_time,
            );
            is.extclk.sync_to_slave(&is.audclk);
        }
    }

    /// 从帧队列取下一帧、做同步补偿并转换进本地缓冲；无帧可取返回 false
    fn refill(&mut self, is: &Arc<VideoState>) -> bool {
        // 跳过 seek 前的过期帧
        let timing = loop {
            let Some(t) = is.sampq.peek_timing() else {
                return false;
            };
            if t.serial != is.audq.serial() {
                is.sampq.next();
                continue;
            }
            break t;
        };

        let (nb_samples, src_rate) = is
            .sampq
            .with_current(|f| (f.payload.nb_samples(), f.payload.sample_rate))
            .unwrap_or((0, 0));
        if nb_samples == 0 || src_rate == 0 {
            is.sampq.next();
            return false;
        }
        let wanted = self.synchronize_audio(is, nb_samples, src_rate);
        let converter = &mut self.converter;
        let data = is
            .sampq
            .with_current(|f| converter.convert(&f.payload, wanted));
        is.sampq.next();
        let Some(data) = data else {
            return false;
        };

        // 时钟按源帧自身的采样率推进：源与设备采样率不同（重采样中）
        // 时帧覆盖的流时间仍由源决定
        self.audio_clock = if timing.pts.is_nan() {
            f64::NAN
        } else {
            timing.pts + nb_samples as f64 / src_rate as f64
        };
        self.audio_clock_serial = timing.serial;
        self.buf = data;
        self.buf_index = 0;
        true
    }

    /// 计算本帧应当输出的每声道采样数
    ///
    /// 音频做主时钟时恒等返回；否则对"音频时钟 - 主时钟"做指数滑动
    /// 平均，平均偏差超过一个回调周期才动手，单帧修正量不超过 ±10%。
    fn synchronize_audio(&mut self, is: &VideoState, nb_samples: usize, src_rate: u32) -> usize {
        if is.master_sync_type() == SyncMaster::Audio {
            return nb_samples;
        }

        let diff = is.audclk.get() - is.master_clock();
        if diff.is_nan() || diff.abs() >= AV_NOSYNC_THRESHOLD {
            // 偏差太大或时钟无效，修正无意义，推倒重来
            self.diff_cum = 0.0;
            self.diff_avg_count = 0;
            return nb_samples;
        }

        self.diff_cum = diff + self.diff_avg_coef * self.diff_cum;
        if self.diff_avg_count < AUDIO_DIFF_AVG_NB {
            self.diff_avg_count += 1;
            return nb_samples;
        }

        let avg_diff = self.diff_cum * (1.0 - self.diff_avg_coef);
        if avg_diff.abs() < self.diff_threshold {
            return nb_samples;
        }

        // 修正量换算成源采样数（nb_samples 数的是源帧的采样）
        let wanted = nb_samples as f64 + avg_diff * src_rate as f64;
        let min = nb_samples * (100 - SAMPLE_CORRECTION_PERCENT_MAX as usize) / 100;
        let max = nb_samples * (100 + SAMPLE_CORRECTION_PERCENT_MAX as usize) / 100;
        (wanted as isize).clamp(min as isize, max as isize) as usize
    }
}

/// 音频泵的外部句柄，交给设备回调持有
///
/// 只弱引用会话：会话销毁后 fill 退化为填静音，设备侧无需感知生命周期。
#[derive(Clone)]
pub struct AudioPumpHandle {
    is: Weak<VideoState>,
}

impl AudioPumpHandle {
    pub(crate) fn new(is: Weak<VideoState>) -> Self {
        Self { is }
    }

    /// 无会话或音频组件未打开时填静音
    pub fn fill(&self, out: &mut [f32]) {
        if let Some(is) = self.is.upgrade() {
            if let Some(pump) = is.audio_pump.lock().as_mut() {
                pump.fill(out);
                return;
            }
        }
        out.fill(0.0);
    }

    pub fn spec(&self) -> Option<AudioSpec> {
        let is = self.is.upgrade()?;
        let spec = is.audio_pump.lock().as_ref().map(|p| p.spec());
        spec
    }
}
