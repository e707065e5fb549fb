use super::error::BuildError;
use super::handler::BoxHandler;

/// 다음 핸들러를 받아 미들웨어가 씌워진 핸들러를 만드는 생성자
pub type Constructor = Box<dyn Fn(BoxHandler) -> Result<BoxHandler, BuildError> + Send + Sync>;

/// 순서가 있는 미들웨어 생성자 목록
///
/// 목록의 첫 번째 미들웨어가 가장 바깥에서 요청을 받습니다. 생성은
/// `then`을 호출할 때 일어나므로 같은 체인으로 여러 번 핸들러를 만들 수
/// 있습니다.
#[derive(Default)]
pub struct Chain {
    constructors: Vec<Constructor>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constructor: Constructor) {
        self.constructors.push(constructor);
    }

    pub fn append(mut self, constructor: Constructor) -> Self {
        self.push(constructor);
        self
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// 체인 끝에 `next`를 연결한 핸들러를 만듭니다.
    pub fn then(&self, next: BoxHandler) -> Result<BoxHandler, BuildError> {
        self.constructors
            .iter()
            .rev()
            .try_fold(next, |handler, constructor| constructor(handler))
    }
}
