use crate::core::{PlayerError, Result};
use crate::player::backend::Packet;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// 队列条目：数据包之外还有两种标记
/// - Flush：seek 造成的不连续点，解码端据此 flush 解码器并采纳新序列号
/// - Eof：解封装读尽，解码端 drain 缓冲帧后标记本流播放完毕
enum Entry {
    Data { pkt: Packet, serial: i32 },
    Flush { serial: i32 },
    Eof { serial: i32 },
}

/// pop 的结果
pub enum PacketPop {
    Data { pkt: Packet, serial: i32 },
    Flush(i32),
    Eof(i32),
    /// 非阻塞模式下队列为空
    Empty,
    /// 队列已中止，消费方应退出
    Aborted,
}

struct Inner {
    queue: VecDeque<Entry>,
    nb_packets: usize,
    size: usize,    // 字节数统计
    duration: f64,  // 已缓冲时长（秒）
    abort: bool,
}

/// 带序列号的压缩包队列，单锁 + 条件变量
///
/// flush 原子地清空内容并递增序列号；任何盖着旧序列号的包
/// 会被消费方静默丢弃，无需与生产方竞争。
pub struct PacketQueue {
    inner: Mutex<Inner>,
    cond: Condvar,
    serial: Arc<AtomicI32>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                nb_packets: 0,
                size: 0,
                duration: 0.0,
                abort: false,
            }),
            cond: Condvar::new(),
            serial: Arc::new(AtomicI32::new(0)),
        }
    }

    /// 入队；队列已中止时失败
    pub fn push(&self, pkt: Packet) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.abort {
            return Err(PlayerError::QueueAborted);
        }
        inner.nb_packets += 1;
        inner.size += pkt.size();
        inner.duration += pkt.duration;
        let serial = self.serial.load(Ordering::SeqCst);
        inner.queue.push_back(Entry::Data { pkt, serial });
        drop(inner);
        self.cond.notify_one();
        Ok(())
    }

    /// 注入 EOF 标记（解封装读尽时每个活跃流各一个）
    pub fn push_eof(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.abort {
            return Err(PlayerError::QueueAborted);
        }
        let serial = self.serial.load(Ordering::SeqCst);
        inner.queue.push_back(Entry::Eof { serial });
        drop(inner);
        self.cond.notify_one();
        Ok(())
    }

    /// 出队；block 为真时挂起直到有数据或被中止
    pub fn pop(&self, block: bool) -> PacketPop {
        let mut inner = self.inner.lock();
        loop {
            if inner.abort {
                return PacketPop::Aborted;
            }
            match inner.queue.pop_front() {
                Some(Entry::Data { pkt, serial }) => {
                    inner.nb_packets -= 1;
                    inner.size -= pkt.size();
                    inner.duration -= pkt.duration;
                    return PacketPop::Data { pkt, serial };
                }
                Some(Entry::Flush { serial }) => return PacketPop::Flush(serial),
                Some(Entry::Eof { serial }) => return PacketPop::Eof(serial),
                None => {
                    if !block {
                        return PacketPop::Empty;
                    }
                    self.cond.wait(&mut inner);
                }
            }
        }
    }

    /// 清空队列内容并递增序列号，随后注入 Flush 标记
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.nb_packets = 0;
        inner.size = 0;
        inner.duration = 0.0;
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        inner.queue.push_back(Entry::Flush { serial });
        drop(inner);
        self.cond.notify_all();
    }

    /// 重新启用一条（可能已中止的）队列：换流时复用同一队列对象
    ///
    /// 序列号前进并注入 Flush 标记，新接手的解码线程由此对齐。
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        inner.abort = false;
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        inner.queue.push_back(Entry::Flush { serial });
        drop(inner);
        self.cond.notify_all();
    }

    /// 中止队列：唤醒所有阻塞方，之后 push/pop 立即失败返回
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.abort = true;
        inner.queue.clear();
        inner.nb_packets = 0;
        inner.size = 0;
        inner.duration = 0.0;
        drop(inner);
        self.cond.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().abort
    }

    pub fn nb_packets(&self) -> usize {
        self.inner.lock().nb_packets
    }

    pub fn byte_size(&self) -> usize {
        self.inner.lock().size
    }

    /// 已缓冲时长（秒）
    pub fn duration(&self) -> f64 {
        self.inner.lock().duration
    }

    pub fn serial(&self) -> i32 {
        self.serial.load(Ordering::SeqCst)
    }

    /// 序列号单元，供时钟绑定
    pub fn serial_ref(&self) -> Arc<AtomicI32> {
        self.serial.clone()
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}
