use std::collections::HashMap;
use std::fs;
use std::io;

/// 사용자 자격증명 검증기
///
/// # 지원하는 해시 알고리즘
/// - bcrypt ($2a$, $2b$, $2y$ 접두사)
pub trait Authenticator: Send + Sync {
    fn verify_credentials(&self, username: &str, password: &str) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("사용자 파일 읽기 실패 ({path}): {source}")]
    UsersFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("잘못된 사용자 항목: {0:?}")]
    InvalidEntry(String),

    #[error("등록된 사용자가 없습니다")]
    NoUsers,
}

/// 설정의 사용자 목록과 사용자 파일을 합친 항목을 반환합니다.
///
/// 파일 형식은 htpasswd와 같이 한 줄에 한 사용자이며, 빈 줄과 `#` 주석은
/// 건너뜁니다. 파일 항목이 설정 항목 뒤에 오므로 같은 사용자라면 파일이
/// 우선합니다.
pub(crate) fn read_users(users: &[String], users_file: Option<&str>) -> Result<Vec<String>, AuthError> {
    let mut entries: Vec<String> = users.iter().map(|u| u.trim().to_string()).collect();

    if let Some(path) = users_file.filter(|p| !p.is_empty()) {
        let content = fs::read_to_string(path).map_err(|source| AuthError::UsersFile {
            path: path.to_string(),
            source,
        })?;
        entries.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    entries.retain(|entry| !entry.is_empty());
    if entries.is_empty() {
        return Err(AuthError::NoUsers);
    }
    Ok(entries)
}

/// `user:hash` 항목 기반 인증기
///
/// # 예시
/// ```text
/// user1:$2y$05$c4WoMPo3SXsafkva.HHa6uXQZWr7oboPiC2bT/r7q1BB8I2s0BRqC
/// user2:$2b$05$LgzK4lXJzxGHVoJ0KhO1E.eQE9L5.H4TD/w0Nz8cP6b/U.ik2M0FW
/// ```
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: HashMap<String, String>,
}

impl UserStore {
    pub fn from_entries(entries: &[String]) -> Result<Self, AuthError> {
        let mut users = HashMap::new();
        for entry in entries {
            let (username, hash) = entry
                .split_once(':')
                .ok_or_else(|| AuthError::InvalidEntry(entry.clone()))?;
            users.insert(username.to_string(), hash.to_string());
        }
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Authenticator for UserStore {
    fn verify_credentials(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .map(|hash| verify_password(password, hash))
            .unwrap_or(false)
    }
}

fn verify_password(password: &str, hash: &str) -> bool {
    if hash.starts_with("$2") {
        bcrypt::verify(password, hash).unwrap_or(false)
    } else {
        // bcrypt가 아닌 해시는 지원하지 않음
        false
    }
}
