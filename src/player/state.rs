use crate::core::{
    system_time, Clock, EventHub, PlaybackState, PlayerEvent, StreamKind, SyncMaster,
};
use crate::core::{AudioFrame, SubtitleFrame, VideoFrame};
use crate::player::audio::AudioPump;
use crate::player::frame_queue::FrameQueue;
use crate::player::packet_queue::PacketQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

// ==================== 同步调度参数 ====================
// 这些是感知调优常量：阈值的"角色"（滞回带、修正上限）比具体数值重要。

/// 视频落后/超前判定带下限（秒）
pub const AV_SYNC_THRESHOLD_MIN: f64 = 0.04;
/// 视频落后/超前判定带上限（秒）
pub const AV_SYNC_THRESHOLD_MAX: f64 = 0.1;
/// 帧时长超过该值时超前改为整帧延长而非加倍（秒）
pub const AV_SYNC_FRAMEDUP_THRESHOLD: f64 = 0.1;
/// 音频采样数补偿的平滑窗口（回调次数）
pub const AUDIO_DIFF_AVG_NB: usize = 20;
/// 单次回调采样数修正上限（百分比）
pub const SAMPLE_CORRECTION_PERCENT_MAX: f64 = 10.0;
/// 连续丢弃迟到帧的单轮上限
pub const MAX_CONSECUTIVE_DROPS: usize = 3;
/// 连续解码失败升级为流级错误的阈值
pub const MAX_DECODE_ERRORS: u32 = 30;

// 读取背压：任一条件满足即暂停读取
/// 全部包队列的字节总量上限
pub const MAX_QUEUE_SIZE: usize = 15 * 1024 * 1024;
/// 单流"足够多"的包数下限
pub const MIN_FRAMES: usize = 25;
/// 单流"足够多"的已缓冲时长（秒）
pub const MIN_BUFFERED_DURATION: f64 = 1.0;

// 外部时钟速率自适应
pub const EXTERNAL_CLOCK_MIN_FRAMES: usize = 2;
pub const EXTERNAL_CLOCK_MAX_FRAMES: usize = 10;
pub const EXTERNAL_CLOCK_SPEED_MIN: f64 = 0.900;
pub const EXTERNAL_CLOCK_SPEED_MAX: f64 = 1.010;
pub const EXTERNAL_CLOCK_SPEED_STEP: f64 = 0.001;

// 帧队列容量（按流类型区分）
pub const VIDEO_FRAME_QUEUE_SIZE: usize = 16;
pub const AUDIO_FRAME_QUEUE_SIZE: usize = 3;
pub const SUBTITLE_FRAME_QUEUE_SIZE: usize = 4;

/// 刷新轮询的基础节拍（秒）
pub const REFRESH_RATE: f64 = 0.01;
/// 快进/快退步长（秒）
pub const SEEK_STEP_SECONDS: f64 = 5.0;
/// 音量调节步长
pub const VOLUME_STEP: f64 = 0.1;

/// 跳转请求；并发请求后者覆盖前者（last-wins）
#[derive(Debug, Clone, Copy)]
pub struct SeekRequest {
    /// 目标位置（秒）
    pub target: f64,
    /// 相对偏移（秒），负值表示后退，决定关键帧搜索方向
    pub rel: f64,
}

/// 播放会话聚合对象：队列、时钟、跨线程标志
///
/// 标量字段都是单字段原子量，没有跨字段的事务性不变量，
/// 由控制器写入、读取线程与刷新循环读取。
pub struct VideoState {
    pub url: String,

    // 包队列（每流一个）
    pub audq: Arc<PacketQueue>,
    pub videoq: Arc<PacketQueue>,
    pub subq: Arc<PacketQueue>,

    // 帧队列
    pub pictq: FrameQueue<VideoFrame>,
    pub sampq: FrameQueue<AudioFrame>,
    pub subpq: FrameQueue<SubtitleFrame>,

    // 三时钟
    pub audclk: Clock,
    pub vidclk: Clock,
    pub extclk: Clock,

    /// 配置的主时钟类型（实际生效类型见 master_sync_type）
    pub sync_master: SyncMaster,

    pub state: Mutex<PlaybackState>,
    pub paused: AtomicBool,
    pub step: AtomicBool,
    pub abort_request: AtomicBool,
    pub realtime: AtomicBool,

    // 活跃流标志（reader 打开/关闭组件时维护）
    pub has_audio: AtomicBool,
    pub has_video: AtomicBool,
    pub has_subtitle: AtomicBool,

    /// 流播放完毕时记录的序列号；i32::MIN 表示未完毕
    pub audio_finished: AtomicI32,
    pub video_finished: AtomicI32,

    pub seek_req: Mutex<Option<SeekRequest>>,
    pub cycle_req: Mutex<Option<StreamKind>>,

    // 读取线程的背压停车位
    reader_parked: Mutex<()>,
    reader_cond: Condvar,

    pub duration: Mutex<f64>,
    pub frame_timer: Mutex<f64>,
    pub max_frame_duration: Mutex<f64>,

    pub last_width: AtomicU32,
    pub last_height: AtomicU32,

    volume_bits: AtomicU64,
    pub muted: AtomicBool,

    pub frame_drops_early: AtomicU64,
    pub frame_drops_late: AtomicU64,

    pub audio_pump: Mutex<Option<AudioPump>>,

    pub events: Arc<EventHub>,
}

impl VideoState {
    pub fn new(url: String, sync_master: SyncMaster, events: Arc<EventHub>) -> Arc<Self> {
        let audq = Arc::new(PacketQueue::new());
        let videoq = Arc::new(PacketQueue::new());
        let subq = Arc::new(PacketQueue::new());

        let pictq = FrameQueue::new(videoq.clone(), VIDEO_FRAME_QUEUE_SIZE, true);
        let sampq = FrameQueue::new(audq.clone(), AUDIO_FRAME_QUEUE_SIZE, true);
        let subpq = FrameQueue::new(subq.clone(), SUBTITLE_FRAME_QUEUE_SIZE, false);

        let audclk = Clock::new(audq.serial_ref());
        let vidclk = Clock::new(videoq.serial_ref());
        let extclk = Clock::independent();

        Arc::new(Self {
            url,
            audq,
            videoq,
            subq,
            pictq,
            sampq,
            subpq,
            audclk,
            vidclk,
            extclk,
            sync_master,
            state: Mutex::new(PlaybackState::Opening),
            paused: AtomicBool::new(false),
            step: AtomicBool::new(false),
            abort_request: AtomicBool::new(false),
            realtime: AtomicBool::new(false),
            has_audio: AtomicBool::new(false),
            has_video: AtomicBool::new(false),
            has_subtitle: AtomicBool::new(false),
            audio_finished: AtomicI32::new(i32::MIN),
            video_finished: AtomicI32::new(i32::MIN),
            seek_req: Mutex::new(None),
            cycle_req: Mutex::new(None),
            reader_parked: Mutex::new(()),
            reader_cond: Condvar::new(),
            duration: Mutex::new(0.0),
            frame_timer: Mutex::new(0.0),
            max_frame_duration: Mutex::new(10.0),
            last_width: AtomicU32::new(0),
            last_height: AtomicU32::new(0),
            volume_bits: AtomicU64::new(0.5f64.to_bits()),
            muted: AtomicBool::new(false),
            frame_drops_early: AtomicU64::new(0),
            frame_drops_late: AtomicU64::new(0),
            audio_pump: Mutex::new(None),
            events,
        })
    }

    // ==================== 主时钟选择 ====================

    /// 实际生效的主时钟类型：配置的主流不存在时逐级降级
    pub fn master_sync_type(&self) -> SyncMaster {
        match self.sync_master {
            SyncMaster::Video => {
                if self.has_video.load(Ordering::SeqCst) {
                    SyncMaster::Video
                } else if self.has_audio.load(Ordering::SeqCst) {
                    SyncMaster::Audio
                } else {
                    SyncMaster::External
                }
            }
            SyncMaster::Audio => {
                if self.has_audio.load(Ordering::SeqCst) {
                    SyncMaster::Audio
                } else {
                    SyncMaster::External
                }
            }
            SyncMaster::External => SyncMaster::External,
        }
    }

    /// 主时钟当前值（秒）
    pub fn master_clock(&self) -> f64 {
        match self.master_sync_type() {
            SyncMaster::Audio => self.audclk.get(),
            SyncMaster::Video => self.vidclk.get(),
            SyncMaster::External => self.extclk.get(),
        }
    }

    /// 按包队列水位微调外部时钟速率（仅外部时钟做主时钟时有意义）
    pub fn check_external_clock_speed(&self) {
        let video_low = self.has_video.load(Ordering::SeqCst)
            && self.videoq.nb_packets() <= EXTERNAL_CLOCK_MIN_FRAMES;
        let audio_low = self.has_audio.load(Ordering::SeqCst)
            && self.audq.nb_packets() <= EXTERNAL_CLOCK_MIN_FRAMES;
        let video_high = !self.has_video.load(Ordering::SeqCst)
            || self.videoq.nb_packets() > EXTERNAL_CLOCK_MAX_FRAMES;
        let audio_high = !self.has_audio.load(Ordering::SeqCst)
            || self.audq.nb_packets() > EXTERNAL_CLOCK_MAX_FRAMES;

        let speed = self.extclk.speed();
        if video_low || audio_low {
            self.extclk
                .set_speed((speed - EXTERNAL_CLOCK_SPEED_STEP).max(EXTERNAL_CLOCK_SPEED_MIN));
        } else if video_high && audio_high {
            self.extclk
                .set_speed((speed + EXTERNAL_CLOCK_SPEED_STEP).min(EXTERNAL_CLOCK_SPEED_MAX));
        } else if speed != 1.0 {
            // 向 1.0 回归
            self.extclk
                .set_speed(speed + EXTERNAL_CLOCK_SPEED_STEP * (1.0 - speed) / (1.0 - speed).abs());
        }
    }

    // ==================== 暂停 / 逐帧 ====================

    /// 切换暂停状态并广播；恢复时补偿 frame_timer 的停摆时间
    pub fn toggle_pause_and_notify(&self) {
        let new_paused = !self.paused.load(Ordering::SeqCst);
        if !new_paused {
            let mut timer = self.frame_timer.lock();
            *timer += system_time() - self.vidclk.last_updated();
        }
        self.vidclk.set_paused(new_paused);
        self.audclk.set_paused(new_paused);
        self.extclk.set_paused(new_paused);
        self.paused.store(new_paused, Ordering::SeqCst);
        self.step.store(false, Ordering::SeqCst);
        *self.state.lock() = if new_paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        self.events.emit(PlayerEvent::PauseState(new_paused));
    }

    /// 暂停中前进一帧：先恢复播放，刷新循环显示一帧后会重新暂停
    pub fn step_to_next_frame(&self) {
        if self.paused.load(Ordering::SeqCst) {
            self.toggle_pause_and_notify();
        }
        self.step.store(true, Ordering::SeqCst);
    }

    // ==================== 跳转 ====================

    /// 记录跳转请求（last-wins）并唤醒读取线程
    pub fn request_seek(&self, target: f64, rel: f64) {
        *self.seek_req.lock() = Some(SeekRequest { target, rel });
        self.wake_reader();
    }

    /// 读取线程的背压/EOF 停车；被唤醒或超时后返回
    pub fn park_reader(&self, timeout_ms: u64) {
        let mut guard = self.reader_parked.lock();
        self.reader_cond
            .wait_for(&mut guard, std::time::Duration::from_millis(timeout_ms));
    }

    pub fn wake_reader(&self) {
        self.reader_cond.notify_all();
    }

    // ==================== 音量 ====================

    pub fn volume(&self) -> f64 {
        f64::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }

    /// 设置音量（截断到 [0,1]），发生变化时广播
    pub fn set_volume(&self, volume: f64) {
        let clamped = volume.clamp(0.0, 1.0);
        let old = f64::from_bits(self.volume_bits.swap(clamped.to_bits(), Ordering::SeqCst));
        if (clamped - old).abs() > f64::EPSILON {
            self.events.emit(PlayerEvent::Volume(clamped));
        }
    }

    // ==================== 收尾 ====================

    /// 中止全部队列并唤醒所有阻塞方，保证各线程尽快退出
    pub fn abort_all(&self) {
        self.abort_request.store(true, Ordering::SeqCst);
        self.audq.abort();
        self.videoq.abort();
        self.subq.abort();
        self.pictq.signal();
        self.sampq.signal();
        self.subpq.signal();
        self.wake_reader();
    }

    /// 两路输出是否都已播放到队尾（EOF 自动停止判定）
    pub fn playback_finished(&self) -> bool {
        let audio_done = !self.has_audio.load(Ordering::SeqCst)
            || (self.audio_finished.load(Ordering::SeqCst) == self.audq.serial()
                && self.sampq.remaining() == 0);
        let video_done = !self.has_video.load(Ordering::SeqCst)
            || (self.video_finished.load(Ordering::SeqCst) == self.videoq.serial()
                && self.pictq.remaining() == 0);
        let any_stream =
            self.has_audio.load(Ordering::SeqCst) || self.has_video.load(Ordering::SeqCst);
        any_stream && audio_done && video_done
    }
}
