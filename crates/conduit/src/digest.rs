/// 分块摘要
///
/// 摘要只用作分块确认的关联键，任何稳定的内容哈希都可以

use sha1::{Digest, Sha1};

/// 计算一段字节的摘要，返回十六进制字符串
pub trait ChunkDigest: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> String;
}

impl<F> ChunkDigest for F
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    fn digest(&self, bytes: &[u8]) -> String {
        self(bytes)
    }
}

/// SHA-1，大写十六进制
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Digest;

impl ChunkDigest for Sha1Digest {
    fn digest(&self, bytes: &[u8]) -> String {
        hex::encode_upper(Sha1::digest(bytes))
    }
}
