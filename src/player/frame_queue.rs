use crate::core::{PlayerError, Result};
use crate::player::packet_queue::PacketQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// 已解码帧及其调度元数据
pub struct QueuedFrame<T> {
    pub payload: T,
    pub pts: f64,      // 显示时间戳（秒），未知为 NaN
    pub duration: f64, // 帧时长（秒），未知为 0
    pub pos: i64,      // 来源包的容器字节偏移
    pub serial: i32,
}

/// 不携带负载的帧元数据，调度决策用（避免热路径上克隆像素数据）
#[derive(Debug, Clone, Copy)]
pub struct FrameTiming {
    pub pts: f64,
    pub duration: f64,
    pub pos: i64,
    pub serial: i32,
}

impl<T> QueuedFrame<T> {
    fn timing(&self) -> FrameTiming {
        FrameTiming {
            pts: self.pts,
            duration: self.duration,
            pos: self.pos,
            serial: self.serial,
        }
    }
}

struct Ring<T> {
    slots: Vec<Option<QueuedFrame<T>>>,
    rindex: usize,
    windex: usize,
    size: usize,
    keep_last: bool,
    /// rindex 指向的帧已经显示过（keep_last 模式下保留作时长参考）
    rindex_shown: bool,
}

/// 固定容量的解码帧环形缓冲
///
/// 生产方在满时挂起，消费方在空时拿不到数据；两侧的挂起都要能被
/// 所属包队列的 abort 或 [`FrameQueue::signal`] 立刻唤醒，保证关停及时。
/// 消费方可以向前窥视一帧，用下一帧的 pts 差推算当前帧的在屏时长。
pub struct FrameQueue<T> {
    inner: Mutex<Ring<T>>,
    cond: Condvar,
    pktq: Arc<PacketQueue>,
}

impl<T> FrameQueue<T> {
    pub fn new(pktq: Arc<PacketQueue>, max_size: usize, keep_last: bool) -> Self {
        let mut slots = Vec::with_capacity(max_size);
        for _ in 0..max_size {
            slots.push(None);
        }
        Self {
            inner: Mutex::new(Ring {
                slots,
                rindex: 0,
                windex: 0,
                size: 0,
                keep_last,
                rindex_shown: false,
            }),
            cond: Condvar::new(),
            pktq,
        }
    }

    /// 入队一帧；满时挂起，队列中止时返回错误
    pub fn push(&self, frame: QueuedFrame<T>) -> Result<()> {
        let mut ring = self.inner.lock();
        while ring.size >= ring.slots.len() {
            if self.pktq.is_aborted() {
                return Err(PlayerError::QueueAborted);
            }
            self.cond.wait(&mut ring);
        }
        if self.pktq.is_aborted() {
            return Err(PlayerError::QueueAborted);
        }
        let windex = ring.windex;
        ring.slots[windex] = Some(frame);
        ring.windex = (windex + 1) % ring.slots.len();
        ring.size += 1;
        drop(ring);
        self.cond.notify_all();
        Ok(())
    }

    /// 未消费帧数（不含已显示的保留帧）
    pub fn remaining(&self) -> usize {
        let ring = self.inner.lock();
        ring.size - ring.rindex_shown as usize
    }

    /// 当前待显示帧的元数据
    pub fn peek_timing(&self) -> Option<FrameTiming> {
        let ring = self.inner.lock();
        if ring.size - ring.rindex_shown as usize == 0 {
            return None;
        }
        let idx = (ring.rindex + ring.rindex_shown as usize) % ring.slots.len();
        ring.slots[idx].as_ref().map(|f| f.timing())
    }

    /// 向前看一帧的元数据（用于推算当前帧时长）
    pub fn next_timing(&self) -> Option<FrameTiming> {
        let ring = self.inner.lock();
        if ring.size - (ring.rindex_shown as usize) < 2 {
            return None;
        }
        let idx = (ring.rindex + ring.rindex_shown as usize + 1) % ring.slots.len();
        ring.slots[idx].as_ref().map(|f| f.timing())
    }

    /// 最近一次显示过的帧的元数据（keep_last 保留槽）
    pub fn last_timing(&self) -> Option<FrameTiming> {
        let ring = self.inner.lock();
        ring.slots[ring.rindex].as_ref().map(|f| f.timing())
    }

    /// 对当前待显示帧执行闭包（持锁访问，避免克隆负载）
    pub fn with_current<R>(&self, f: impl FnOnce(&QueuedFrame<T>) -> R) -> Option<R> {
        let ring = self.inner.lock();
        if ring.size - ring.rindex_shown as usize == 0 {
            return None;
        }
        let idx = (ring.rindex + ring.rindex_shown as usize) % ring.slots.len();
        ring.slots[idx].as_ref().map(f)
    }

    /// 对保留槽中最近显示的帧执行闭包（暂停重绘、显示路径用）
    pub fn with_last<R>(&self, f: impl FnOnce(&QueuedFrame<T>) -> R) -> Option<R> {
        let ring = self.inner.lock();
        ring.slots[ring.rindex].as_ref().map(f)
    }

    /// 前进读索引；keep_last 模式下第一次调用只标记"已显示"
    pub fn next(&self) {
        let mut ring = self.inner.lock();
        if ring.keep_last && !ring.rindex_shown {
            ring.rindex_shown = true;
            return;
        }
        let rindex = ring.rindex;
        ring.slots[rindex] = None;
        ring.rindex = (rindex + 1) % ring.slots.len();
        ring.size -= 1;
        drop(ring);
        self.cond.notify_all();
    }

    pub fn rindex_shown(&self) -> bool {
        self.inner.lock().rindex_shown
    }

    /// 最近显示帧的容器偏移；序列号已过期时返回 None
    pub fn last_shown_pos(&self) -> Option<i64> {
        let ring = self.inner.lock();
        if !ring.rindex_shown {
            return None;
        }
        match ring.slots[ring.rindex].as_ref() {
            Some(f) if f.serial == self.pktq.serial() => Some(f.pos),
            _ => None,
        }
    }

    /// 唤醒所有阻塞方（teardown 时在包队列 abort 之后调用）
    pub fn signal(&self) {
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn fq(max: usize, keep_last: bool) -> (Arc<PacketQueue>, FrameQueue<u32>) {
        let pktq = Arc::new(PacketQueue::new());
        let q = FrameQueue::new(pktq.clone(), max, keep_last);
        (pktq, q)
    }

    fn frame(v: u32, pts: f64, serial: i32) -> QueuedFrame<u32> {
        QueuedFrame {
            payload: v,
            pts,
            duration: 0.04,
            pos: v as i64,
            serial,
        }
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let (pktq, q) = fq(3, false);
        let q = Arc::new(q);
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..10u32 {
                    if q.push(frame(i, i as f64 * 0.04, 0)).is_err() {
                        return i;
                    }
                }
                10
            })
        };
        // 消费若干帧后中止，生产方不得越界也不得死等
        for _ in 0..4 {
            while q.remaining() == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            assert!(q.remaining() <= 3);
            q.next();
        }
        pktq.abort();
        q.signal();
        let pushed = producer.join().unwrap();
        assert!(pushed >= 4);
    }

    #[test]
    fn keep_last_preserves_reference_frame() {
        let (_pktq, q) = fq(4, true);
        q.push(frame(1, 0.0, 0)).unwrap();
        q.push(frame(2, 0.04, 0)).unwrap();

        assert_eq!(q.peek_timing().unwrap().pos, 1);
        q.next(); // 第一次只标记已显示
        assert!(q.rindex_shown());
        assert_eq!(q.last_timing().unwrap().pos, 1);
        assert_eq!(q.peek_timing().unwrap().pos, 2);
        assert_eq!(q.remaining(), 1);

        q.next(); // 释放保留槽，读索引前进
        assert_eq!(q.last_timing().unwrap().pos, 2);
        assert_eq!(q.remaining(), 0);
    }

    #[test]
    fn lookahead_sees_next_frame() {
        let (_pktq, q) = fq(4, true);
        q.push(frame(1, 0.0, 0)).unwrap();
        assert!(q.next_timing().is_none());
        q.push(frame(2, 0.04, 0)).unwrap();
        let next = q.next_timing().unwrap();
        assert_eq!(next.pos, 2);
        assert!((next.pts - 0.04).abs() < 1e-9);
        // 已显示的保留帧不计入，向前看需要两个未消费帧
        q.next();
        assert!(q.next_timing().is_none());
        q.push(frame(3, 0.08, 0)).unwrap();
        assert_eq!(q.next_timing().unwrap().pos, 3);
    }

    #[test]
    fn abort_unblocks_full_producer() {
        let (pktq, q) = fq(1, false);
        let q = Arc::new(q);
        q.push(frame(1, 0.0, 0)).unwrap();
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.push(frame(2, 0.04, 0)).is_err());
        thread::sleep(Duration::from_millis(30));
        pktq.abort();
        q.signal();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn last_shown_pos_tracks_serial() {
        let (pktq, q) = fq(4, true);
        q.push(frame(7, 0.0, 0)).unwrap();
        q.next();
        assert_eq!(q.last_shown_pos(), Some(7));
        pktq.flush(); // 序列号前进，保留帧过期
        assert_eq!(q.last_shown_pos(), None);
    }
}
