use crate::core::{PlaybackState, PlayerEvent, StreamInfo, StreamKind};
use crate::player::audio::AudioPump;
use crate::player::backend::MediaBackend;
use crate::player::decoder::{spawn_audio_worker, spawn_subtitle_worker, spawn_video_worker};
use crate::player::packet_queue::PacketQueue;
use crate::player::state::{VideoState, MAX_QUEUE_SIZE, MIN_BUFFERED_DURATION, MIN_FRAMES};
use crate::core::AudioSpec;
use log::{debug, error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// 期望的设备回调粒度（每声道采样数），实际以协商结果为准
const WANTED_BUFFER_SAMPLES: usize = 1024;

/// 读取线程：打开媒体、挑流、起解码线程、喂包队列
///
/// seek 和换流请求都在这个线程里消化，保证对解封装器的独占访问。
pub fn spawn_reader(is: Arc<VideoState>, backend: Box<dyn MediaBackend>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("demux_reader".to_string())
        .spawn(move || read_loop(is, backend))
        .expect("spawn demux_reader")
}

/// 单个已打开的流组件：元数据 + 解码线程句柄
struct OpenStream {
    stream: StreamInfo,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Components {
    audio: Option<OpenStream>,
    video: Option<OpenStream>,
    subtitle: Option<OpenStream>,
}

fn read_loop(is: Arc<VideoState>, mut backend: Box<dyn MediaBackend>) {
    info!("开始打开媒体: {}", is.url);
    let mut demuxer = match backend.open(&is.url) {
        Ok(d) => d,
        Err(e) => {
            error!("打开媒体失败: {}", e);
            is.events.emit(PlayerEvent::Message {
                text: format!("打开媒体失败: {}", e),
                fatal: true,
            });
            *is.state.lock() = PlaybackState::Stopped;
            is.events.emit(PlayerEvent::StopFinished);
            return;
        }
    };

    let streams = demuxer.streams();
    let duration = demuxer.duration();
    is.realtime.store(demuxer.is_realtime(), Ordering::SeqCst);
    *is.duration.lock() = duration;
    is.events.emit(PlayerEvent::TotalSeconds(duration as i64));

    let mut components = Components::default();
    if let Some(stream) = pick_best(&streams, StreamKind::Video) {
        open_component(&is, &mut backend, stream, &mut components);
    }
    if let Some(stream) = pick_best(&streams, StreamKind::Audio) {
        open_component(&is, &mut backend, stream, &mut components);
    }
    if let Some(stream) = pick_best(&streams, StreamKind::Subtitle) {
        open_component(&is, &mut backend, stream, &mut components);
    }

    if components.audio.is_none() && components.video.is_none() {
        error!("媒体中没有可用的音频或视频流");
        is.events.emit(PlayerEvent::Message {
            text: "媒体中没有可用的音频或视频流".to_string(),
            fatal: true,
        });
        close_all(&is, &mut components);
        *is.state.lock() = PlaybackState::Stopped;
        is.events.emit(PlayerEvent::StopFinished);
        return;
    }

    *is.state.lock() = PlaybackState::Playing;
    info!(
        "媒体已打开: 时长 {:.1}s, 音频={}, 视频={}, 字幕={}",
        duration,
        components.audio.is_some(),
        components.video.is_some(),
        components.subtitle.is_some()
    );

    let mut eof = false;
    let mut stop_emitted = false;

    while !is.abort_request.load(Ordering::SeqCst) {
        // seek 请求（last-wins，连发只执行最后一个）
        let seek = is.seek_req.lock().take();
        if let Some(req) = seek {
            debug!("执行跳转: {:.2}s (rel {:+.1})", req.target, req.rel);
            match demuxer.seek(req.target, req.rel < 0.0) {
                Ok(()) => {
                    if components.audio.is_some() {
                        is.audq.flush();
                    }
                    if components.video.is_some() {
                        is.videoq.flush();
                    }
                    if components.subtitle.is_some() {
                        is.subq.flush();
                    }
                    is.extclk.set(req.target, is.extclk.serial() + 1);
                    eof = false;
                    stop_emitted = false;
                    if is.paused.load(Ordering::SeqCst) {
                        // 暂停中 seek：显示目标处第一帧后重新停住
                        is.step_to_next_frame();
                    }
                }
                Err(e) => {
                    warn!("跳转失败: {}", e);
                    is.events.emit(PlayerEvent::Message {
                        text: format!("跳转失败: {}", e),
                        fatal: false,
                    });
                }
            }
            continue;
        }

        // 换流请求
        let cycle = is.cycle_req.lock().take();
        if let Some(kind) = cycle {
            cycle_stream(&is, &mut backend, &streams, kind, &mut components);
            continue;
        }

        // 背压：缓冲够多就歇一会（实时流不限流）
        if !is.realtime.load(Ordering::SeqCst) {
            let total_size =
                is.audq.byte_size() + is.videoq.byte_size() + is.subq.byte_size();
            let enough = has_enough(&is.audq, components.audio.is_some())
                && has_enough(&is.videoq, components.video.is_some())
                && has_enough(&is.subq, components.subtitle.is_some());
            if total_size > MAX_QUEUE_SIZE || enough {
                is.park_reader(10);
                continue;
            }
        }

        // 非实时源播放到尾：通知一次，收尾仍由控制方决定
        if !is.paused.load(Ordering::SeqCst)
            && !is.realtime.load(Ordering::SeqCst)
            && eof
            && is.playback_finished()
        {
            if !stop_emitted {
                info!("播放完毕");
                is.events.emit(PlayerEvent::Stop);
                stop_emitted = true;
            }
            is.park_reader(100);
            continue;
        }

        match demuxer.read_packet() {
            Ok(Some(pkt)) => {
                let idx = pkt.stream_index;
                let _ = if matches(&components.audio, idx) {
                    is.audq.push(pkt)
                } else if matches(&components.video, idx) {
                    is.videoq.push(pkt)
                } else if matches(&components.subtitle, idx) {
                    is.subq.push(pkt)
                } else {
                    Ok(()) // 未选中的流，直接丢弃
                };
            }
            Ok(None) => {
                if !eof {
                    debug!("解封装读尽, 注入 EOF 标记");
                    if components.audio.is_some() {
                        let _ = is.audq.push_eof();
                    }
                    if components.video.is_some() {
                        let _ = is.videoq.push_eof();
                    }
                    eof = true;
                }
                is.park_reader(10);
            }
            Err(e) => {
                warn!("读包失败: {}", e);
                is.events.emit(PlayerEvent::Message {
                    text: format!("读包失败: {}", e),
                    fatal: false,
                });
                is.park_reader(10);
            }
        }
    }

    close_all(&is, &mut components);
    debug!("读取线程退出");
}

fn matches(component: &Option<OpenStream>, index: usize) -> bool {
    component
        .as_ref()
        .map(|c| c.stream.index == index)
        .unwrap_or(false)
}

/// ffplay 式"够多了"判定：包数过线且缓冲时长可用
fn has_enough(q: &PacketQueue, open: bool) -> bool {
    if !open || q.is_aborted() {
        return true;
    }
    q.nb_packets() > MIN_FRAMES
        && (q.duration() <= 0.0 || q.duration() > MIN_BUFFERED_DURATION)
}

/// 同类型流里挑"最好"的一条
fn pick_best(streams: &[StreamInfo], kind: StreamKind) -> Option<StreamInfo> {
    let candidates: Vec<&StreamInfo> = streams.iter().filter(|s| s.kind == kind).collect();
    match kind {
        StreamKind::Video => candidates
            .into_iter()
            .max_by_key(|s| (s.width as u64 * s.height as u64, s.bit_rate))
            .cloned(),
        StreamKind::Audio => candidates
            .into_iter()
            .max_by_key(|s| (s.bit_rate, s.channels))
            .cloned(),
        StreamKind::Subtitle => candidates.first().map(|s| (*s).clone()),
    }
}

/// 打开一个流组件：队列复位、解码器、工作线程；音频还要协商输出
fn open_component(
    is: &Arc<VideoState>,
    backend: &mut Box<dyn MediaBackend>,
    stream: StreamInfo,
    components: &mut Components,
) {
    match stream.kind {
        StreamKind::Video => {
            let dec = match backend.open_video_decoder(&stream) {
                Ok(d) => d,
                Err(e) => {
                    warn!("打开视频解码器失败: {}", e);
                    is.events.emit(PlayerEvent::Message {
                        text: format!("打开视频解码器失败: {}", e),
                        fatal: false,
                    });
                    return;
                }
            };
            if is.videoq.is_aborted() {
                is.videoq.start();
            }
            if stream.width > 0 && stream.height > 0 {
                is.last_width.store(stream.width, Ordering::SeqCst);
                is.last_height.store(stream.height, Ordering::SeqCst);
                is.events.emit(PlayerEvent::FrameDimensionsChanged {
                    width: stream.width,
                    height: stream.height,
                });
            }
            let worker = spawn_video_worker(is.clone(), dec, stream.clone());
            is.has_video.store(true, Ordering::SeqCst);
            is.video_finished.store(i32::MIN, Ordering::SeqCst);
            components.video = Some(OpenStream { stream, worker });
        }
        StreamKind::Audio => {
            let wanted = AudioSpec {
                sample_rate: stream.sample_rate,
                channels: stream.channels,
                buffer_samples: WANTED_BUFFER_SAMPLES,
            };
            let (spec, converter) = match backend.open_audio_output(wanted) {
                Ok(pair) => pair,
                Err(e) => {
                    // 设备不可用不致命：降级为无声继续播
                    warn!("打开音频输出失败, 降级为纯视频: {}", e);
                    is.events.emit(PlayerEvent::Message {
                        text: format!("打开音频输出失败: {}", e),
                        fatal: false,
                    });
                    return;
                }
            };
            let dec = match backend.open_audio_decoder(&stream) {
                Ok(d) => d,
                Err(e) => {
                    warn!("打开音频解码器失败: {}", e);
                    is.events.emit(PlayerEvent::Message {
                        text: format!("打开音频解码器失败: {}", e),
                        fatal: false,
                    });
                    return;
                }
            };
            if is.audq.is_aborted() {
                is.audq.start();
            }
            *is.audio_pump.lock() =
                Some(AudioPump::new(Arc::downgrade(is), spec, converter));
            let worker = spawn_audio_worker(is.clone(), dec, stream.clone());
            is.has_audio.store(true, Ordering::SeqCst);
            is.audio_finished.store(i32::MIN, Ordering::SeqCst);
            components.audio = Some(OpenStream { stream, worker });
        }
        StreamKind::Subtitle => {
            let dec = match backend.open_subtitle_decoder(&stream) {
                Ok(d) => d,
                Err(e) => {
                    warn!("打开字幕解码器失败: {}", e);
                    return;
                }
            };
            if is.subq.is_aborted() {
                is.subq.start();
            }
            let worker = spawn_subtitle_worker(is.clone(), dec, stream.clone());
            is.has_subtitle.store(true, Ordering::SeqCst);
            components.subtitle = Some(OpenStream { stream, worker });
        }
    }
}

/// 关闭一个流组件：中止队列、唤醒帧队列、等解码线程退出
fn close_component(is: &Arc<VideoState>, kind: StreamKind, components: &mut Components) {
    let open = match kind {
        StreamKind::Audio => components.audio.take(),
        StreamKind::Video => components.video.take(),
        StreamKind::Subtitle => components.subtitle.take(),
    };
    let Some(open) = open else {
        return;
    };
    match kind {
        StreamKind::Audio => {
            is.has_audio.store(false, Ordering::SeqCst);
            is.audio_pump.lock().take();
            is.audq.abort();
            is.sampq.signal();
        }
        StreamKind::Video => {
            is.has_video.store(false, Ordering::SeqCst);
            is.videoq.abort();
            is.pictq.signal();
        }
        StreamKind::Subtitle => {
            is.has_subtitle.store(false, Ordering::SeqCst);
            is.subq.abort();
            is.subpq.signal();
        }
    }
    if let Err(e) = open.worker.join() {
        warn!("解码线程退出异常: {:?}", e);
    }
}

fn close_all(is: &Arc<VideoState>, components: &mut Components) {
    close_component(is, StreamKind::Audio, components);
    close_component(is, StreamKind::Video, components);
    close_component(is, StreamKind::Subtitle, components);
}

/// 切换到同类型的下一条流（环形），没有候选流则原样不动
fn cycle_stream(
    is: &Arc<VideoState>,
    backend: &mut Box<dyn MediaBackend>,
    streams: &[StreamInfo],
    kind: StreamKind,
    components: &mut Components,
) {
    let current = match kind {
        StreamKind::Audio => components.audio.as_ref().map(|c| c.stream.index),
        StreamKind::Video => components.video.as_ref().map(|c| c.stream.index),
        StreamKind::Subtitle => components.subtitle.as_ref().map(|c| c.stream.index),
    };
    let same_kind: Vec<&StreamInfo> = streams.iter().filter(|s| s.kind == kind).collect();
    if same_kind.len() < 2 {
        debug!("没有可切换的候选流: {:?}", kind);
        return;
    }
    // 当前流之后的下一条（环形）
    let next = match current {
        Some(idx) => {
            let pos = same_kind.iter().position(|s| s.index == idx).unwrap_or(0);
            same_kind[(pos + 1) % same_kind.len()].clone()
        }
        None => same_kind[0].clone(),
    };
    info!("切换{:?}流: {:?} -> {}", kind, current, next.index);
    close_component(is, kind, components);
    open_component(is, backend, next, components);
}
