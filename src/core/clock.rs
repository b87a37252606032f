use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// 主从时钟偏差超过该值时不再渐进修正，直接硬复位（秒）
pub const AV_NOSYNC_THRESHOLD: f64 = 10.0;
/// 小于该偏差不做修正（死区，秒）
const SYNC_DEAD_BAND: f64 = 0.005;
/// 每次渐进修正吃掉的偏差比例
const SYNC_CORRECTION_FRACTION: f64 = 0.5;
/// 单次渐进修正的最大步长（秒）
const SYNC_MAX_STEP: f64 = 0.1;

static CLOCK_EPOCH: OnceLock<Instant> = OnceLock::new();

/// 单调系统时间（秒），全部时钟运算的公共基准
pub fn system_time() -> f64 {
    CLOCK_EPOCH
        .get_or_init(Instant::now)
        .elapsed()
        .as_secs_f64()
}

struct ClockInner {
    pts: f64,          // 最近一次 set 时的显示时间戳
    pts_drift: f64,    // pts - 设置时刻，get 时由此推算当前值
    last_updated: f64, // 最近一次 set 的系统时间
    speed: f64,        // 播放速率（1.0 = 正常）
    serial: i32,       // 设置该时钟的包序列号
    paused: bool,
}

/// 播放时钟 - 用于音视频同步
///
/// 值以 `speed` 速率从设置时刻起自然推进；当所引用队列的序列号越过
/// `serial`（队列在其下被 flush）时，`get()` 返回 NaN 表示失效。
#[derive(Clone)]
pub struct Clock {
    inner: Arc<Mutex<ClockInner>>,
    /// 所属包队列的序列号引用；独立时钟（外部时钟）引用自身
    queue_serial: Arc<AtomicI32>,
    owns_serial: bool,
}

impl Clock {
    /// 创建绑定到某个包队列序列号的时钟
    pub fn new(queue_serial: Arc<AtomicI32>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                pts: f64::NAN,
                pts_drift: f64::NAN,
                last_updated: system_time(),
                speed: 1.0,
                serial: -1,
                paused: false,
            })),
            queue_serial,
            owns_serial: false,
        }
    }

    /// 创建自引用序列号的独立时钟（外部/自由运行时钟）
    pub fn independent() -> Self {
        let mut clock = Self::new(Arc::new(AtomicI32::new(-1)));
        clock.owns_serial = true;
        clock
    }

    /// 获取当前时钟值；序列号失配或从未设置时返回 NaN
    pub fn get(&self) -> f64 {
        let inner = self.inner.lock();
        if self.queue_serial.load(Ordering::SeqCst) != inner.serial {
            return f64::NAN;
        }
        if inner.paused {
            inner.pts
        } else {
            let time = system_time();
            inner.pts_drift + time - (time - inner.last_updated) * (1.0 - inner.speed)
        }
    }

    /// 在指定系统时间点设置时钟
    pub fn set_at(&self, pts: f64, serial: i32, time: f64) {
        let mut inner = self.inner.lock();
        inner.pts = pts;
        inner.last_updated = time;
        inner.pts_drift = pts - time;
        inner.serial = serial;
        if self.owns_serial {
            self.queue_serial.store(serial, Ordering::SeqCst);
        }
    }

    pub fn set(&self, pts: f64, serial: i32) {
        self.set_at(pts, serial, system_time());
    }

    /// 改变速率前先在当前值处重置基准，保证时间连续
    pub fn set_speed(&self, speed: f64) {
        let current = self.get();
        let serial = self.serial();
        if !current.is_nan() {
            self.set(current, serial);
        }
        self.inner.lock().speed = speed;
    }

    pub fn speed(&self) -> f64 {
        self.inner.lock().speed
    }

    /// 暂停/恢复；恢复时在当前值处重置基准
    pub fn set_paused(&self, paused: bool) {
        let current = self.get();
        let serial = self.serial();
        if !current.is_nan() {
            self.set(current, serial);
        }
        self.inner.lock().paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn serial(&self) -> i32 {
        self.inner.lock().serial
    }

    pub fn last_updated(&self) -> f64 {
        self.inner.lock().last_updated
    }

    /// 让本时钟向驱动时钟（slave）渐进校正
    ///
    /// 偏差超过 [`AV_NOSYNC_THRESHOLD`] 或本时钟无效时直接硬复位；
    /// 否则在死区之外按比例吃掉偏差，步长受限，避免可感知的跳变。
    pub fn sync_to_slave(&self, slave: &Clock) {
        let target = slave.get();
        if target.is_nan() {
            return;
        }
        let current = self.get();
        if current.is_nan() || (target - current).abs() > AV_NOSYNC_THRESHOLD {
            self.set(target, slave.serial());
            return;
        }
        let delta = target - current;
        if delta.abs() < SYNC_DEAD_BAND {
            return;
        }
        let step = (delta * SYNC_CORRECTION_FRACTION).clamp(-SYNC_MAX_STEP, SYNC_MAX_STEP);
        self.set(current + step, self.serial());
    }
}
