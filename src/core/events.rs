use parking_lot::RwLock;
use std::sync::Arc;

/// 发给展示层的播放事件集合
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// 错误/提示信息；fatal 区分"会话终止"与"降级继续"
    Message { text: String, fatal: bool },
    /// 视频帧宽高发生变化
    FrameDimensionsChanged { width: u32, height: u32 },
    /// 视频总时长（秒）
    TotalSeconds(i64),
    /// 当前播放时长（秒）
    PlaySeconds(i64),
    /// 音量变化（0.0 - 1.0）
    Volume(f64),
    /// 播放暂停状态
    PauseState(bool),
    /// 停止播放
    Stop,
    /// 停止播放完成
    StopFinished,
    /// 开始播放
    StartPlay(String),
}

/// 事件接收方（展示层注册）
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: PlayerEvent);
}

/// 事件分发中心：会话向所有已注册接收方广播
#[derive(Default)]
pub struct EventHub {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    pub fn emit(&self, event: PlayerEvent) {
        for sink in self.sinks.read().iter() {
            sink.on_event(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Collector(Mutex<Vec<PlayerEvent>>);

    impl EventSink for Collector {
        fn on_event(&self, event: PlayerEvent) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn hub_fans_out_to_all_sinks() {
        let hub = EventHub::new();
        let a = Arc::new(Collector(Mutex::new(Vec::new())));
        let b = Arc::new(Collector(Mutex::new(Vec::new())));
        hub.subscribe(a.clone());
        hub.subscribe(b.clone());
        hub.emit(PlayerEvent::PauseState(true));
        assert_eq!(a.0.lock().len(), 1);
        assert_eq!(b.0.lock().as_slice(), &[PlayerEvent::PauseState(true)]);
    }
}
