use crate::core::{
    EventHub, EventSink, MediaInfo, PlaybackState, PlayerEvent, StreamKind, SyncMaster,
};
use crate::player::audio::AudioPumpHandle;
use crate::player::backend::{MediaBackend, VideoOutput};
use crate::player::refresh::Refresher;
use crate::player::reader::spawn_reader;
use crate::player::state::{VideoState, SEEK_STEP_SECONDS, VOLUME_STEP};
use log::{info, warn};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

struct Session {
    is: Arc<VideoState>,
    reader: Option<JoinHandle<()>>,
    refresh: Option<JoinHandle<()>>,
}

/// 播放控制器：一次一个会话，公开全部播放控制入口
///
/// 按值持有、按需创建，不做全局单例；展示层通过 [`EventHub`]
/// 订阅事件，音频设备通过 [`AudioPumpHandle`] 拉数据。
pub struct PlaybackController {
    events: Arc<EventHub>,
    sync_master: SyncMaster,
    session: Option<Session>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self {
            events: Arc::new(EventHub::new()),
            sync_master: SyncMaster::Audio,
            session: None,
        }
    }

    /// 注册事件接收方
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.events.subscribe(sink);
    }

    /// 设置主时钟类型，下一次 start_play 生效
    pub fn set_sync_master(&mut self, master: SyncMaster) {
        self.sync_master = master;
    }

    /// 打开媒体并开始播放；已有会话先停掉
    pub fn start_play(
        &mut self,
        url: &str,
        backend: Box<dyn MediaBackend>,
        video_out: Box<dyn VideoOutput>,
    ) {
        self.do_exit();

        info!("开始播放: {}", url);
        let is = VideoState::new(url.to_string(), self.sync_master, self.events.clone());
        let reader = spawn_reader(is.clone(), backend);
        let refresh = {
            let is = is.clone();
            thread::Builder::new()
                .name("video_refresh".to_string())
                .spawn(move || Refresher::new(is, video_out).run())
                .expect("spawn video_refresh")
        };
        self.session = Some(Session {
            is,
            reader: Some(reader),
            refresh: Some(refresh),
        });
        self.events.emit(PlayerEvent::StartPlay(url.to_string()));
    }

    /// 暂停/恢复
    pub fn on_pause(&self) {
        if let Some(session) = &self.session {
            session.is.toggle_pause_and_notify();
        }
    }

    /// 暂停中前进一帧
    pub fn step_frame(&self) {
        if let Some(session) = &self.session {
            session.is.step_to_next_frame();
        }
    }

    /// 停止播放并等全部线程退出
    pub fn on_stop(&mut self) {
        self.events.emit(PlayerEvent::Stop);
        self.do_exit();
        self.events.emit(PlayerEvent::StopFinished);
    }

    /// 按进度百分比跳转（0.0 - 1.0）
    pub fn on_play_seek(&self, percent: f64) {
        if let Some(session) = &self.session {
            let duration = *session.is.duration.lock();
            if duration <= 0.0 {
                warn!("时长未知, 忽略百分比跳转");
                return;
            }
            let target = (duration * percent.clamp(0.0, 1.0)).clamp(0.0, duration);
            let rel = target - self.position();
            session.is.request_seek(target, rel);
        }
    }

    /// 快进固定步长
    pub fn on_seek_forward(&self) {
        self.seek_by(SEEK_STEP_SECONDS);
    }

    /// 快退固定步长
    pub fn on_seek_back(&self) {
        self.seek_by(-SEEK_STEP_SECONDS);
    }

    fn seek_by(&self, rel: f64) {
        if let Some(session) = &self.session {
            let duration = *session.is.duration.lock();
            let mut target = self.position() + rel;
            if duration > 0.0 {
                target = target.clamp(0.0, duration);
            } else {
                target = target.max(0.0);
            }
            session.is.request_seek(target, rel);
        }
    }

    /// 设置音量（0.0 - 1.0）
    pub fn on_play_volume(&self, volume: f64) {
        if let Some(session) = &self.session {
            session.is.set_volume(volume);
        }
    }

    pub fn on_add_volume(&self) {
        if let Some(session) = &self.session {
            let v = session.is.volume();
            session.is.set_volume(v + VOLUME_STEP);
        }
    }

    pub fn on_sub_volume(&self) {
        if let Some(session) = &self.session {
            let v = session.is.volume();
            session.is.set_volume(v - VOLUME_STEP);
        }
    }

    pub fn toggle_mute(&self) {
        if let Some(session) = &self.session {
            let muted = session.is.muted.load(Ordering::SeqCst);
            session.is.muted.store(!muted, Ordering::SeqCst);
        }
    }

    /// 切换到同类型的下一条流
    pub fn on_cycle_channel(&self, kind: StreamKind) {
        if let Some(session) = &self.session {
            *session.is.cycle_req.lock() = Some(kind);
            session.is.wake_reader();
        }
    }

    /// 音频设备回调入口：无会话或无音频时填静音
    pub fn fill_audio(&self, out: &mut [f32]) {
        self.audio_handle().fill(out);
    }

    /// 可克隆的音频拉取句柄，交给设备回调长期持有
    pub fn audio_handle(&self) -> AudioPumpHandle {
        match &self.session {
            Some(session) => AudioPumpHandle::new(Arc::downgrade(&session.is)),
            None => AudioPumpHandle::new(Weak::new()),
        }
    }

    pub fn state(&self) -> PlaybackState {
        match &self.session {
            Some(session) => *session.is.state.lock(),
            None => PlaybackState::Stopped,
        }
    }

    /// 当前播放位置（秒）；时钟未就绪时为 0
    pub fn position(&self) -> f64 {
        match &self.session {
            Some(session) => {
                let pos = session.is.master_clock();
                if pos.is_nan() {
                    0.0
                } else {
                    pos.max(0.0)
                }
            }
            None => 0.0,
        }
    }

    /// 总时长（秒），未知为 0
    pub fn duration(&self) -> f64 {
        match &self.session {
            Some(session) => *session.is.duration.lock(),
            None => 0.0,
        }
    }

    /// 累计丢帧数（解码侧提前丢弃, 刷新侧迟到丢弃）
    pub fn frame_drops(&self) -> (u64, u64) {
        match &self.session {
            Some(session) => (
                session.is.frame_drops_early.load(Ordering::SeqCst),
                session.is.frame_drops_late.load(Ordering::SeqCst),
            ),
            None => (0, 0),
        }
    }

    /// 当前会话的媒体信息快照
    pub fn media_info(&self) -> MediaInfo {
        match &self.session {
            Some(session) => MediaInfo {
                duration: *session.is.duration.lock(),
                width: session.is.last_width.load(Ordering::SeqCst),
                height: session.is.last_height.load(Ordering::SeqCst),
                ..MediaInfo::default()
            },
            None => MediaInfo::default(),
        }
    }

    /// 中止会话并等全部线程退出；可重复调用
    fn do_exit(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        info!("停止播放: {}", session.is.url);
        *session.is.state.lock() = PlaybackState::Stopping;
        session.is.abort_all();
        if let Some(reader) = session.reader.take() {
            if let Err(e) = reader.join() {
                warn!("读取线程退出异常: {:?}", e);
            }
        }
        if let Some(refresh) = session.refresh.take() {
            if let Err(e) = refresh.join() {
                warn!("刷新线程退出异常: {:?}", e);
            }
        }
        *session.is.state.lock() = PlaybackState::Stopped;
    }
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.do_exit();
    }
}
