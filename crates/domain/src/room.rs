//! 私聊房间标识
//!
//! 房间只是传输层的分组键，不落库：对两个身份排序后用 `$` 拼接，
//! 取 SHA-256 摘要的小写十六进制作为房间标识。

use std::fmt;

use data_encoding::HEXLOWER;
use ring::digest;
use serde::{Deserialize, Serialize};

use crate::value_objects::Identity;

const PAIR_SEPARATOR: &[u8] = b"$";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// 由一对身份推导房间标识，与参数顺序无关。
    pub fn for_pair(a: &Identity, b: &Identity) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };

        let mut context = digest::Context::new(&digest::SHA256);
        context.update(low.as_str().as_bytes());
        context.update(PAIR_SEPARATOR);
        context.update(high.as_str().as_bytes());

        Self(HEXLOWER.encode(context.finish().as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
