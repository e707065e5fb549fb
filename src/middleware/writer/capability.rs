use super::ResponseWriter;

/// writer가 노출하는 선택 기능 집합
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    flush: bool,
    hijack: bool,
    close_notify: bool,
}

impl Capabilities {
    pub const NONE: Self = Self::new(false, false, false);

    pub const fn new(flush: bool, hijack: bool, close_notify: bool) -> Self {
        Self {
            flush,
            hijack,
            close_notify,
        }
    }

    /// 래핑 시점에 하위 writer의 기능을 감지합니다.
    ///
    /// 래퍼는 이 값을 그대로 보고하고, 감지되지 않은 기능이 호출되면
    /// `WriterError`를 반환해야 합니다.
    pub fn detect(inner: &dyn ResponseWriter) -> Self {
        inner.capabilities()
    }

    pub fn can_flush(&self) -> bool {
        self.flush
    }

    pub fn can_hijack(&self) -> bool {
        self.hijack
    }

    pub fn can_close_notify(&self) -> bool {
        self.close_notify
    }

    pub fn without_hijack(self) -> Self {
        Self {
            hijack: false,
            ..self
        }
    }
}
