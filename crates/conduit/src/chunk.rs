/// 负载分块

use std::num::NonZeroUsize;

/// 分块上传时每块的最大字节数
pub const DEFAULT_HIGH_WATER_MARK: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => panic!("high water mark must be non-zero"),
};

/// 将缓冲区切分为连续的块
///
/// 除最后一块外每块长度均为 `high_water_mark`；长度恰为整数倍时不会多出空块。
/// 空输入返回一个空块，由调用方跳过。
pub fn split_buffer(buffer: &[u8], high_water_mark: NonZeroUsize) -> Vec<&[u8]> {
    if buffer.is_empty() {
        return vec![buffer];
    }
    buffer.chunks(high_water_mark.get()).collect()
}
