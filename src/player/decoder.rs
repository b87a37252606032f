use crate::core::{PlayerEvent, StreamInfo, SyncMaster, AV_NOSYNC_THRESHOLD};
use crate::player::backend::{AudioDecode, DecodedAudio, DecodedVideo, SubtitleDecode, VideoDecode};
use crate::player::frame_queue::QueuedFrame;
use crate::player::state::{VideoState, MAX_DECODE_ERRORS};
use crate::player::packet_queue::PacketPop;
use log::{debug, error, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// 解码工作线程：每个活跃流一个，从包队列取包、解码、帧入帧队列。
// 序列号贯穿始终：Flush 标记处 flush 解码器并采纳新序列号，旧序列号
// 的包直接丢弃；Eof 标记处 drain 缓冲帧并记录"本流播放完毕"。

/// 视频解码线程
pub fn spawn_video_worker(
    is: Arc<VideoState>,
    mut dec: Box<dyn VideoDecode>,
    stream: StreamInfo,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("video_decoder".to_string())
        .spawn(move || {
            debug!("视频解码线程启动: 流 {}", stream.index);
            let fr = stream.frame_rate.as_f64();
            let frame_duration = if fr > 0.0 { 1.0 / fr } else { 0.0 };
            let mut next_pts = f64::NAN;
            let mut errors: u32 = 0;

            loop {
                match is.videoq.pop(true) {
                    PacketPop::Aborted => break,
                    PacketPop::Empty => continue,
                    PacketPop::Flush(serial) => {
                        dec.flush();
                        next_pts = f64::NAN;
                        debug!("视频解码器 flush, 序列号 {}", serial);
                    }
                    PacketPop::Eof(serial) => {
                        match dec.drain() {
                            Ok(frames) => {
                                for d in frames {
                                    if queue_video_frame(&is, d, &mut next_pts, frame_duration, -1, serial)
                                        .is_err()
                                    {
                                        break;
                                    }
                                }
                            }
                            Err(e) => warn!("视频解码器 drain 失败: {}", e),
                        }
                        is.video_finished.store(serial, Ordering::SeqCst);
                        debug!("视频流解码完毕, 序列号 {}", serial);
                    }
                    PacketPop::Data { pkt, serial } => {
                        if serial != is.videoq.serial() {
                            continue;
                        }
                        match dec.decode(&pkt) {
                            Ok(frames) => {
                                errors = 0;
                                let mut aborted = false;
                                for d in frames {
                                    if queue_video_frame(
                                        &is,
                                        d,
                                        &mut next_pts,
                                        frame_duration,
                                        pkt.pos,
                                        serial,
                                    )
                                    .is_err()
                                    {
                                        aborted = true;
                                        break;
                                    }
                                }
                                if aborted {
                                    break;
                                }
                            }
                            Err(e) => {
                                errors += 1;
                                warn!("视频解码失败 ({}/{}): {}", errors, MAX_DECODE_ERRORS, e);
                                if errors > MAX_DECODE_ERRORS {
                                    error!("视频流连续解码失败过多, 放弃该流");
                                    is.video_finished
                                        .store(is.videoq.serial(), Ordering::SeqCst);
                                    is.videoq.abort();
                                    is.events.emit(PlayerEvent::Message {
                                        text: "视频流解码失败, 已停用视频".to_string(),
                                        fatal: false,
                                    });
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            debug!("视频解码线程退出");
        })
        .expect("spawn video_decoder")
}

/// 解码帧入队前的超前丢帧判定 + pts 回退推算
fn queue_video_frame(
    is: &Arc<VideoState>,
    d: DecodedVideo,
    next_pts: &mut f64,
    frame_duration: f64,
    pos: i64,
    serial: i32,
) -> Result<(), ()> {
    let pts = match d.pts {
        Some(p) => p,
        None => *next_pts,
    };
    if !pts.is_nan() {
        *next_pts = pts + frame_duration;
    }

    // 追赶模式：视频不做主时钟且明显落后时，在解码侧就丢掉迟到帧
    if !pts.is_nan()
        && is.master_sync_type() != SyncMaster::Video
        && !is.paused.load(Ordering::SeqCst)
        && !is.step.load(Ordering::SeqCst)
    {
        let diff = pts - is.master_clock();
        if !diff.is_nan()
            && diff.abs() < AV_NOSYNC_THRESHOLD
            && diff < 0.0
            && serial == is.vidclk.serial()
            && is.videoq.nb_packets() > 0
        {
            is.frame_drops_early.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
    }

    is.pictq
        .push(QueuedFrame {
            payload: d.frame,
            pts,
            duration: frame_duration,
            pos,
            serial,
        })
        .map_err(|_| ())
}

/// 音频解码线程
pub fn spawn_audio_worker(
    is: Arc<VideoState>,
    mut dec: Box<dyn AudioDecode>,
    stream: StreamInfo,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("audio_decoder".to_string())
        .spawn(move || {
            debug!("音频解码线程启动: 流 {}", stream.index);
            let mut next_pts = f64::NAN;
            let mut errors: u32 = 0;

            loop {
                match is.audq.pop(true) {
                    PacketPop::Aborted => break,
                    PacketPop::Empty => continue,
                    PacketPop::Flush(serial) => {
                        dec.flush();
                        next_pts = f64::NAN;
                        debug!("音频解码器 flush, 序列号 {}", serial);
                    }
                    PacketPop::Eof(serial) => {
                        match dec.drain() {
                            Ok(frames) => {
                                for d in frames {
                                    if queue_audio_frame(&is, d, &mut next_pts, -1, serial).is_err()
                                    {
                                        break;
                                    }
                                }
                            }
                            Err(e) => warn!("音频解码器 drain 失败: {}", e),
                        }
                        is.audio_finished.store(serial, Ordering::SeqCst);
                        debug!("音频流解码完毕, 序列号 {}", serial);
                    }
                    PacketPop::Data { pkt, serial } => {
                        if serial != is.audq.serial() {
                            continue;
                        }
                        match dec.decode(&pkt) {
                            Ok(frames) => {
                                errors = 0;
                                let mut aborted = false;
                                for d in frames {
                                    if queue_audio_frame(&is, d, &mut next_pts, pkt.pos, serial)
                                        .is_err()
                                    {
                                        aborted = true;
                                        break;
                                    }
                                }
                                if aborted {
                                    break;
                                }
                            }
                            Err(e) => {
                                errors += 1;
                                warn!("音频解码失败 ({}/{}): {}", errors, MAX_DECODE_ERRORS, e);
                                if errors > MAX_DECODE_ERRORS {
                                    error!("音频流连续解码失败过多, 放弃该流");
                                    is.audio_finished
                                        .store(is.audq.serial(), Ordering::SeqCst);
                                    is.audq.abort();
                                    is.events.emit(PlayerEvent::Message {
                                        text: "音频流解码失败, 已停用音频".to_string(),
                                        fatal: false,
                                    });
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            debug!("音频解码线程退出");
        })
        .expect("spawn audio_decoder")
}

fn queue_audio_frame(
    is: &Arc<VideoState>,
    d: DecodedAudio,
    next_pts: &mut f64,
    pos: i64,
    serial: i32,
) -> Result<(), ()> {
    let pts = match d.pts {
        Some(p) => p,
        None => *next_pts,
    };
    let duration = if d.frame.sample_rate > 0 {
        d.frame.nb_samples() as f64 / d.frame.sample_rate as f64
    } else {
        0.0
    };
    if !pts.is_nan() {
        *next_pts = pts + duration;
    }

    is.sampq
        .push(QueuedFrame {
            payload: d.frame,
            pts,
            duration,
            pos,
            serial,
        })
        .map_err(|_| ())
}

/// 字幕解码线程
pub fn spawn_subtitle_worker(
    is: Arc<VideoState>,
    mut dec: Box<dyn SubtitleDecode>,
    stream: StreamInfo,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("subtitle_decoder".to_string())
        .spawn(move || {
            debug!("字幕解码线程启动: 流 {}", stream.index);
            loop {
                match is.subq.pop(true) {
                    PacketPop::Aborted => break,
                    PacketPop::Empty => continue,
                    PacketPop::Flush(serial) => {
                        dec.flush();
                        debug!("字幕解码器 flush, 序列号 {}", serial);
                    }
                    PacketPop::Eof(_) => {}
                    PacketPop::Data { pkt, serial } => {
                        if serial != is.subq.serial() {
                            continue;
                        }
                        match dec.decode(&pkt) {
                            Ok(subs) => {
                                let mut aborted = false;
                                for d in subs {
                                    let pts = d.pts.unwrap_or(f64::NAN);
                                    if is
                                        .subpq
                                        .push(QueuedFrame {
                                            payload: d.frame,
                                            pts,
                                            duration: d.duration,
                                            pos: pkt.pos,
                                            serial,
                                        })
                                        .is_err()
                                    {
                                        aborted = true;
                                        break;
                                    }
                                }
                                if aborted {
                                    break;
                                }
                            }
                            Err(e) => warn!("字幕解码失败: {}", e),
                        }
                    }
                }
            }
            debug!("字幕解码线程退出");
        })
        .expect("spawn subtitle_decoder")
}
