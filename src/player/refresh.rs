use crate::core::{system_time, PlayerEvent, SyncMaster};
use crate::player::backend::VideoOutput;
use crate::player::frame_queue::FrameTiming;
use crate::player::state::{
    VideoState, AV_SYNC_FRAMEDUP_THRESHOLD, AV_SYNC_THRESHOLD_MAX, AV_SYNC_THRESHOLD_MIN,
    MAX_CONSECUTIVE_DROPS, REFRESH_RATE,
};
use log::{debug, trace};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// 由帧间 pts 差推算当前帧的名义在屏时长；跨序列号或异常差值时回退
pub(crate) fn vp_duration(vp: FrameTiming, next: FrameTiming, max_frame_duration: f64) -> f64 {
    if vp.serial == next.serial {
        let d = next.pts - vp.pts;
        if d.is_nan() || d <= 0.0 || d > max_frame_duration {
            vp.duration
        } else {
            d
        }
    } else {
        0.0
    }
}

/// 按视频时钟与主时钟的偏差调整名义延迟
///
/// 落后则压缩（最小为 0），超前则加倍；长帧超前时改为整帧延长，
/// 避免把一个本来就长的停留时间再翻倍。判定带随帧时长在
/// [AV_SYNC_THRESHOLD_MIN, AV_SYNC_THRESHOLD_MAX] 内伸缩。
pub(crate) fn adjust_delay(delay: f64, diff: f64, max_frame_duration: f64) -> f64 {
    if diff.is_nan() || diff.abs() >= max_frame_duration {
        return delay;
    }
    let sync_threshold = delay.clamp(AV_SYNC_THRESHOLD_MIN, AV_SYNC_THRESHOLD_MAX);
    if diff <= -sync_threshold {
        (delay + diff).max(0.0)
    } else if diff >= sync_threshold && delay > AV_SYNC_FRAMEDUP_THRESHOLD {
        delay + diff
    } else if diff >= sync_threshold {
        2.0 * delay
    } else {
        delay
    }
}

/// 刷新调度器：单线程轮询，决定"此刻该不该把下一帧送出去"
///
/// 不依赖垂直同步信号，靠短睡眠 + 每轮重算的剩余等待时间逼近
/// 目标显示时刻；上限节拍 [`REFRESH_RATE`] 保证暂停等状态变化
/// 能被及时观察到。
pub struct Refresher {
    is: Arc<VideoState>,
    out: Box<dyn VideoOutput>,
    last_play_seconds: i64,
}

impl Refresher {
    pub fn new(is: Arc<VideoState>, out: Box<dyn VideoOutput>) -> Self {
        Self {
            is,
            out,
            last_play_seconds: -1,
        }
    }

    pub fn run(&mut self) {
        debug!("刷新调度线程启动");
        let mut remaining = 0.0f64;
        while !self.is.abort_request.load(Ordering::SeqCst) {
            if remaining > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(remaining));
            }
            remaining = REFRESH_RATE;
            self.refresh(&mut remaining);
        }
        debug!("刷新调度线程退出");
    }

    /// 单轮调度；`remaining` 输出到下一轮前应等待的时间（秒）
    pub fn refresh(&mut self, remaining: &mut f64) {
        let is = self.is.clone();

        if is.master_sync_type() == SyncMaster::External && is.realtime.load(Ordering::SeqCst) {
            is.check_external_clock_speed();
        }

        self.emit_play_seconds(&is);

        if !is.has_video.load(Ordering::SeqCst) {
            return;
        }

        let mut advanced = false;
        let mut dropped = 0usize;
        loop {
            if is.pictq.remaining() == 0 {
                break;
            }
            let vp = match is.pictq.peek_timing() {
                Some(t) => t,
                None => break,
            };
            // seek 前解出的帧整批跳过
            if vp.serial != is.videoq.serial() {
                is.pictq.next();
                continue;
            }
            let last = is.pictq.last_timing();
            if last.map(|l| l.serial) != Some(vp.serial) {
                *is.frame_timer.lock() = system_time();
            }
            if is.paused.load(Ordering::SeqCst) {
                break;
            }

            let max_frame_duration = *is.max_frame_duration.lock();
            let last_duration = match last {
                Some(l) => vp_duration(l, vp, max_frame_duration),
                None => vp.duration,
            };
            let delay = self.compute_target_delay(&is, last_duration, max_frame_duration);

            let time = system_time();
            let frame_timer = *is.frame_timer.lock();
            if time < frame_timer + delay {
                // 还没到点，继续停留在上一帧
                *remaining = (frame_timer + delay - time).min(*remaining);
                break;
            }
            {
                let mut timer = is.frame_timer.lock();
                *timer += delay;
                // 节拍器落后太多就重新对表，避免之后连环追赶
                if delay > 0.0 && time - *timer > AV_SYNC_THRESHOLD_MAX {
                    *timer = time;
                }
            }

            if !vp.pts.is_nan() {
                is.vidclk.set(vp.pts, vp.serial);
                is.extclk.sync_to_slave(&is.vidclk);
            }

            // 迟到丢帧：下一帧都该上屏了就别再显示这一帧（单轮有界，防饿死）
            if let Some(next) = is.pictq.next_timing() {
                let duration = vp_duration(vp, next, max_frame_duration);
                if !is.step.load(Ordering::SeqCst)
                    && is.master_sync_type() != SyncMaster::Video
                    && system_time() > *is.frame_timer.lock() + duration
                    && dropped < MAX_CONSECUTIVE_DROPS
                {
                    is.frame_drops_late.fetch_add(1, Ordering::SeqCst);
                    trace!("丢弃迟到帧 pts={}", vp.pts);
                    is.pictq.next();
                    dropped += 1;
                    continue;
                }
            }

            self.expire_subtitles(&is);

            is.pictq.next();
            advanced = true;

            // 逐帧模式：显示完这一帧立刻重新暂停
            if is.step.load(Ordering::SeqCst) && !is.paused.load(Ordering::SeqCst) {
                is.toggle_pause_and_notify();
            }
            break;
        }

        if advanced {
            self.display(&is);
        }
    }

    fn compute_target_delay(&self, is: &VideoState, delay: f64, max_frame_duration: f64) -> f64 {
        if is.master_sync_type() == SyncMaster::Video {
            return delay;
        }
        let diff = is.vidclk.get() - is.master_clock();
        adjust_delay(delay, diff, max_frame_duration)
    }

    /// 清理已过期/过期序列号的字幕帧
    fn expire_subtitles(&self, is: &VideoState) {
        while let Some(sp) = is.subpq.peek_timing() {
            let stale = sp.serial != is.subq.serial();
            let clock = is.vidclk.get();
            let expired =
                !clock.is_nan() && !sp.pts.is_nan() && sp.pts + sp.duration < clock;
            if stale || expired {
                is.subpq.next();
            } else {
                break;
            }
        }
    }

    /// 把保留槽中的帧交给视频输出，并维护宽高变化事件
    fn display(&mut self, is: &Arc<VideoState>) {
        let clock = is.vidclk.get();
        let subtitle_active = is
            .subpq
            .peek_timing()
            .map(|sp| {
                sp.serial == is.subq.serial()
                    && !clock.is_nan()
                    && !sp.pts.is_nan()
                    && sp.pts <= clock
            })
            .unwrap_or(false);

        let out = &mut self.out;
        let mut dims = None;
        is.pictq.with_last(|f| {
            dims = Some((f.payload.width, f.payload.height));
            if subtitle_active {
                is.subpq
                    .with_current(|s| out.request_display(&f.payload, Some(&s.payload)));
            } else {
                out.request_display(&f.payload, None);
            }
        });

        if let Some((w, h)) = dims {
            let old_w = is.last_width.swap(w, Ordering::SeqCst);
            let old_h = is.last_height.swap(h, Ordering::SeqCst);
            if old_w != w || old_h != h {
                is.events
                    .emit(PlayerEvent::FrameDimensionsChanged { width: w, height: h });
            }
        }
    }

    /// 整秒变化时上报播放进度
    fn emit_play_seconds(&mut self, is: &Arc<VideoState>) {
        let pos = is.master_clock();
        if pos.is_nan() {
            return;
        }
        let secs = pos.floor() as i64;
        if secs >= 0 && secs != self.last_play_seconds {
            self.last_play_seconds = secs;
            is.events.emit(PlayerEvent::PlaySeconds(secs));
        }
    }
}
