// 端到端播放管线测试：用假的解封装器/解码器驱动完整线程拓扑，
// 验证事件、时钟与控制入口的对外行为。

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use videoctl::core::{
    PixelFormat, Rational, Result, SampleFormat, StreamInfo,
};
use videoctl::player::backend::{DecodedAudio, DecodedVideo};
use videoctl::{
    AudioDecode, AudioFrame, Demuxer, EventSink, MediaBackend, Packet, PlaybackController,
    PlayerError, PlayerEvent, SampleConverter, StreamKind, SubtitleDecode, VideoDecode, VideoFrame,
    VideoOutput,
};

const VIDEO_FPS: f64 = 25.0;
const AUDIO_RATE: u32 = 48000;
const AUDIO_SAMPLES_PER_PACKET: usize = 1024;

// ==================== 假后端 ====================

struct FakeDemuxer {
    duration: f64,
    with_audio: bool,
    next_video_pts: f64,
    next_audio_pts: f64,
    pos: i64,
    seeks: Arc<Mutex<Vec<f64>>>,
}

impl FakeDemuxer {
    fn new(duration: f64, with_audio: bool, seeks: Arc<Mutex<Vec<f64>>>) -> Self {
        Self {
            duration,
            with_audio,
            next_video_pts: 0.0,
            next_audio_pts: 0.0,
            pos: 0,
            seeks,
        }
    }
}

impl Demuxer for FakeDemuxer {
    fn streams(&self) -> Vec<StreamInfo> {
        let mut video = StreamInfo::new(0, StreamKind::Video);
        video.width = 640;
        video.height = 360;
        video.frame_rate = Rational::new(25, 1);
        video.bit_rate = 1_000_000;
        let mut out = vec![video];
        if self.with_audio {
            let mut audio = StreamInfo::new(1, StreamKind::Audio);
            audio.sample_rate = AUDIO_RATE;
            audio.channels = 2;
            audio.bit_rate = 128_000;
            out.push(audio);
        }
        out
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        // 轻微节奏感，让连发的控制命令有机会被合并
        std::thread::sleep(Duration::from_millis(1));
        let video_pending = self.next_video_pts < self.duration;
        let audio_pending = self.with_audio && self.next_audio_pts < self.duration;
        if !video_pending && !audio_pending {
            return Ok(None);
        }
        self.pos += 1;
        let take_video =
            video_pending && (!audio_pending || self.next_video_pts <= self.next_audio_pts);
        if take_video {
            let pts = self.next_video_pts;
            self.next_video_pts += 1.0 / VIDEO_FPS;
            Ok(Some(Packet {
                stream_index: 0,
                pts: Some(pts),
                duration: 1.0 / VIDEO_FPS,
                pos: self.pos,
                data: vec![0u8; 256],
            }))
        } else {
            let pts = self.next_audio_pts;
            self.next_audio_pts += AUDIO_SAMPLES_PER_PACKET as f64 / AUDIO_RATE as f64;
            Ok(Some(Packet {
                stream_index: 1,
                pts: Some(pts),
                duration: AUDIO_SAMPLES_PER_PACKET as f64 / AUDIO_RATE as f64,
                pos: self.pos,
                data: vec![0u8; 256],
            }))
        }
    }

    fn seek(&mut self, target: f64, _backward: bool) -> Result<()> {
        self.seeks.lock().push(target);
        self.next_video_pts = target;
        self.next_audio_pts = target;
        Ok(())
    }
}

struct FakeVideoDecode {
    /// 每包解码耗时；模拟解码跟不上帧率的机器
    stall: Duration,
}

impl VideoDecode for FakeVideoDecode {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedVideo>> {
        if !self.stall.is_zero() {
            std::thread::sleep(self.stall);
        }
        Ok(vec![DecodedVideo {
            frame: VideoFrame {
                width: 640,
                height: 360,
                format: PixelFormat::RGBA,
                sample_aspect_ratio: Rational::new(1, 1),
                data: vec![0u8; 64],
            },
            pts: packet.pts,
        }])
    }

    fn flush(&mut self) {}

    fn drain(&mut self) -> Result<Vec<DecodedVideo>> {
        Ok(Vec::new())
    }
}

struct FakeAudioDecode;

impl AudioDecode for FakeAudioDecode {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedAudio>> {
        Ok(vec![DecodedAudio {
            frame: AudioFrame {
                sample_rate: AUDIO_RATE,
                channels: 2,
                format: SampleFormat::F32,
                data: vec![0.25f32; AUDIO_SAMPLES_PER_PACKET * 2],
            },
            pts: packet.pts,
        }])
    }

    fn flush(&mut self) {}

    fn drain(&mut self) -> Result<Vec<DecodedAudio>> {
        Ok(Vec::new())
    }
}

struct PadConverter;

impl SampleConverter for PadConverter {
    fn convert(&mut self, frame: &AudioFrame, wanted_nb_samples: usize) -> Vec<f32> {
        let mut out = frame.data.clone();
        out.resize(wanted_nb_samples * frame.channels as usize, 0.0);
        out
    }
}

struct FakeBackend {
    duration: f64,
    with_audio: bool,
    video_stall: Duration,
    seeks: Arc<Mutex<Vec<f64>>>,
}

impl FakeBackend {
    fn new(duration: f64, with_audio: bool) -> (Self, Arc<Mutex<Vec<f64>>>) {
        let seeks = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                duration,
                with_audio,
                video_stall: Duration::ZERO,
                seeks: seeks.clone(),
            },
            seeks,
        )
    }
}

impl MediaBackend for FakeBackend {
    fn open(&mut self, _url: &str) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(FakeDemuxer::new(
            self.duration,
            self.with_audio,
            self.seeks.clone(),
        )))
    }

    fn open_video_decoder(&mut self, _stream: &StreamInfo) -> Result<Box<dyn VideoDecode>> {
        Ok(Box::new(FakeVideoDecode {
            stall: self.video_stall,
        }))
    }

    fn open_audio_decoder(&mut self, _stream: &StreamInfo) -> Result<Box<dyn AudioDecode>> {
        Ok(Box::new(FakeAudioDecode))
    }

    fn open_subtitle_decoder(&mut self, _stream: &StreamInfo) -> Result<Box<dyn SubtitleDecode>> {
        Err(PlayerError::Other("无字幕解码器".to_string()))
    }

    fn open_audio_output(
        &mut self,
        wanted: videoctl::AudioSpec,
    ) -> Result<(videoctl::AudioSpec, Box<dyn SampleConverter>)> {
        Ok((wanted, Box::new(PadConverter)))
    }
}

struct CollectingOutput {
    displayed: Arc<Mutex<usize>>,
}

impl VideoOutput for CollectingOutput {
    fn request_display(&mut self, _frame: &VideoFrame, _subtitle: Option<&videoctl::SubtitleFrame>) {
        *self.displayed.lock() += 1;
    }
}

fn output() -> (Box<dyn VideoOutput>, Arc<Mutex<usize>>) {
    let displayed = Arc::new(Mutex::new(0));
    (
        Box::new(CollectingOutput {
            displayed: displayed.clone(),
        }),
        displayed,
    )
}

// ==================== 事件采集 ====================

struct EventCollector {
    events: Mutex<Vec<PlayerEvent>>,
}

impl EventCollector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn snapshot(&self) -> Vec<PlayerEvent> {
        self.events.lock().clone()
    }

    /// 等待某个事件出现；超时返回 false
    fn wait_for(&self, timeout: Duration, mut pred: impl FnMut(&PlayerEvent) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.events.lock().iter().any(&mut pred) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn count(&self, mut pred: impl FnMut(&PlayerEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for EventCollector {
    fn on_event(&self, event: PlayerEvent) {
        self.events.lock().push(event);
    }
}

// ==================== 场景 ====================

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn open_reports_dimensions_and_duration() {
    init_logs();
    let (backend, _seeks) = FakeBackend::new(10.0, true);
    let (out, _) = output();
    let collector = EventCollector::new();
    let mut ctl = PlaybackController::new();
    ctl.subscribe(collector.clone());
    ctl.start_play("fake://movie", Box::new(backend), out);

    assert!(collector.wait_for(Duration::from_secs(1), |e| matches!(
        e,
        PlayerEvent::TotalSeconds(10)
    )));
    assert!(collector.wait_for(Duration::from_secs(1), |e| matches!(
        e,
        PlayerEvent::FrameDimensionsChanged {
            width: 640,
            height: 360
        }
    )));
    assert!(collector.wait_for(Duration::from_secs(1), |e| matches!(
        e,
        PlayerEvent::StartPlay(url) if url == "fake://movie"
    )));
    // 尺寸不变就不再重复广播
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(
        collector.count(|e| matches!(e, PlayerEvent::FrameDimensionsChanged { .. })),
        1
    );
    ctl.on_stop();
    assert!(collector.wait_for(Duration::from_secs(1), |e| matches!(
        e,
        PlayerEvent::StopFinished
    )));
}

#[test]
fn pause_freezes_playback_position() {
    init_logs();
    // 纯视频源：主时钟回退到外部时钟，位置完全由本库驱动
    let (backend, _seeks) = FakeBackend::new(10.0, false);
    let (out, displayed) = output();
    let collector = EventCollector::new();
    let mut ctl = PlaybackController::new();
    ctl.subscribe(collector.clone());
    ctl.start_play("fake://video-only", Box::new(backend), out);

    // 等到真的开始出帧
    let deadline = Instant::now() + Duration::from_secs(2);
    while ctl.position() < 0.08 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(ctl.position() >= 0.08, "播放位置迟迟不前进");
    assert!(*displayed.lock() > 0);

    ctl.on_pause();
    assert!(collector.wait_for(Duration::from_secs(1), |e| matches!(
        e,
        PlayerEvent::PauseState(true)
    )));
    let frozen = ctl.position();
    std::thread::sleep(Duration::from_millis(300));
    assert!(
        (ctl.position() - frozen).abs() < 0.02,
        "暂停后位置仍在漂移"
    );

    ctl.on_pause();
    assert!(collector.wait_for(Duration::from_secs(1), |e| matches!(
        e,
        PlayerEvent::PauseState(false)
    )));
    std::thread::sleep(Duration::from_millis(200));
    assert!(ctl.position() > frozen + 0.05, "恢复后位置没有继续前进");
    ctl.on_stop();
}

#[test]
fn volume_steps_clamp_and_dedup() {
    let (backend, _seeks) = FakeBackend::new(10.0, true);
    let (out, _) = output();
    let collector = EventCollector::new();
    let mut ctl = PlaybackController::new();
    ctl.subscribe(collector.clone());
    ctl.start_play("fake://movie", Box::new(backend), out);

    for _ in 0..6 {
        ctl.on_add_volume();
    }
    // 0.5 起步, 五次加到 1.0, 第六次不再变化也不再发事件
    let volumes: Vec<f64> = collector
        .snapshot()
        .into_iter()
        .filter_map(|e| match e {
            PlayerEvent::Volume(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(volumes.len(), 5);
    assert!((volumes.last().unwrap() - 1.0).abs() < 1e-9);

    ctl.on_sub_volume();
    let count = collector.count(|e| matches!(e, PlayerEvent::Volume(_)));
    assert_eq!(count, 6);
    ctl.on_stop();
}

#[test]
fn rapid_seeks_collapse_to_last_target() {
    let (backend, seeks) = FakeBackend::new(10.0, true);
    let (out, _) = output();
    let mut ctl = PlaybackController::new();
    ctl.start_play("fake://movie", Box::new(backend), out);
    std::thread::sleep(Duration::from_millis(100));

    ctl.on_play_seek(0.2);
    ctl.on_play_seek(0.5);

    let deadline = Instant::now() + Duration::from_secs(2);
    while seeks.lock().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(Duration::from_millis(100));
    let recorded = seeks.lock().clone();
    assert!(!recorded.is_empty(), "跳转没有到达解封装器");
    assert!(recorded.len() <= 2, "连发跳转没有合并: {:?}", recorded);
    assert!((recorded.last().unwrap() - 5.0).abs() < 1e-9);
    ctl.on_stop();
}

#[test]
fn seek_steps_move_from_current_position() {
    let (backend, seeks) = FakeBackend::new(10.0, true);
    let (out, _) = output();
    let mut ctl = PlaybackController::new();
    ctl.start_play("fake://movie", Box::new(backend), out);
    std::thread::sleep(Duration::from_millis(100));

    ctl.on_seek_forward();
    let deadline = Instant::now() + Duration::from_secs(2);
    while seeks.lock().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let recorded = seeks.lock().clone();
    assert!(!recorded.is_empty());
    // 位置接近 0 时快进落在步长附近, 且不会越过总时长
    let target = *recorded.last().unwrap();
    assert!(target > 0.0 && target <= 10.0);
    ctl.on_stop();
}

#[test]
fn audio_pull_drives_audio_clock() {
    let (backend, _seeks) = FakeBackend::new(10.0, true);
    let (out, _) = output();
    let mut ctl = PlaybackController::new();
    ctl.start_play("fake://movie", Box::new(backend), out);
    std::thread::sleep(Duration::from_millis(200));

    // 模拟音频设备回调：持续拉取推动音频时钟
    let handle = ctl.audio_handle();
    let mut buf = vec![0.0f32; 2048];
    for _ in 0..100 {
        handle.fill(&mut buf);
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(
        ctl.position() > 0.1,
        "音频拉取没有推动播放位置: {}",
        ctl.position()
    );
    ctl.on_stop();
}

#[test]
fn slow_video_decode_drops_frames_without_blocking_audio() {
    init_logs();
    // 解一帧要 100ms, 帧率却是 25fps: 视频注定追不上音频主时钟
    let (mut backend, _seeks) = FakeBackend::new(10.0, true);
    backend.video_stall = Duration::from_millis(100);
    let (out, displayed) = output();
    let mut ctl = PlaybackController::new();
    ctl.start_play("fake://slow-decode", Box::new(backend), out);

    // 按设备回调的节奏持续拉音频; 每次拉取都必须立刻返回
    let handle = ctl.audio_handle();
    let mut buf = vec![0.0f32; 2048];
    for _ in 0..150 {
        let t0 = Instant::now();
        handle.fill(&mut buf);
        assert!(
            t0.elapsed() < Duration::from_millis(50),
            "音频拉取被慢速视频解码拖住"
        );
        std::thread::sleep(Duration::from_millis(10));
    }

    let (early, late) = ctl.frame_drops();
    assert!(early + late > 0, "视频解不动时没有丢帧追赶");
    assert!(*displayed.lock() > 0, "丢帧追赶期间画面完全不更新");
    assert!(
        ctl.position() > 0.5,
        "播放位置没有继续前进: {}",
        ctl.position()
    );
    ctl.on_stop();
}

#[test]
fn short_source_reports_stop_at_end() {
    init_logs();
    // 0.3 秒的纯视频源, 播完后应广播一次 Stop, 但会话仍由调用方收尾
    let (backend, _seeks) = FakeBackend::new(0.3, false);
    let (out, _) = output();
    let collector = EventCollector::new();
    let mut ctl = PlaybackController::new();
    ctl.subscribe(collector.clone());
    ctl.start_play("fake://short", Box::new(backend), out);

    assert!(
        collector.wait_for(Duration::from_secs(5), |e| matches!(e, PlayerEvent::Stop)),
        "播放完毕没有广播 Stop"
    );
    // Stop 只是通知, 会话还活着
    assert!(!collector
        .snapshot()
        .iter()
        .any(|e| matches!(e, PlayerEvent::StopFinished)));
    ctl.on_stop();
    assert!(collector.wait_for(Duration::from_secs(1), |e| matches!(
        e,
        PlayerEvent::StopFinished
    )));
}

#[test]
fn stop_is_idempotent_and_joins_threads() {
    let (backend, _seeks) = FakeBackend::new(10.0, true);
    let (out, _) = output();
    let mut ctl = PlaybackController::new();
    ctl.start_play("fake://movie", Box::new(backend), out);
    std::thread::sleep(Duration::from_millis(100));
    ctl.on_stop();
    ctl.on_stop();
    assert_eq!(ctl.state(), videoctl::PlaybackState::Stopped);
    // 停止后音频句柄退化为静音
    let mut buf = vec![1.0f32; 64];
    ctl.fill_audio(&mut buf);
    assert!(buf.iter().all(|s| *s == 0.0));
}
