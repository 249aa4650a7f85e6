//! write データのチャンク分割
//!
//! 1 回の write リクエストに載せる web-safe base64 は最大 `max_chunk_len` 文字。
//! エンコード後の文字列を先頭から切り分けるだけで、並べ替えや結合はしない。

/// write 1 回分のペイロード（web-safe base64、パディングなし）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    payload: String,
}

impl Chunk {
    /// エンコード済み文字列
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// エンコード済み文字列の長さ
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// raw バイト列を web-safe base64 のチャンク列に分割する
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chunk_len: usize,
}

impl Chunker {
    /// # 引数
    /// - `max_chunk_len`: 1 チャンクの最大文字数（0 は 1 に切り上げる）
    pub fn new(max_chunk_len: usize) -> Self {
        Chunker {
            max_chunk_len: max_chunk_len.max(1),
        }
    }

    pub fn max_chunk_len(&self) -> usize {
        self.max_chunk_len
    }

    /// raw バイト列をエンコードしてチャンクに分割する
    ///
    /// 空のバイト列からはチャンクを作らない。
    pub fn split(&self, raw: &[u8]) -> Vec<Chunk> {
        let encoded = relay_codec::encode(raw);
        self.split_encoded(&encoded)
    }

    /// エンコード済み文字列をチャンクに分割する
    ///
    /// base64 は ASCII のみなのでバイト単位で切ってよい。
    pub fn split_encoded(&self, encoded: &str) -> Vec<Chunk> {
        encoded
            .as_bytes()
            .chunks(self.max_chunk_len)
            .map(|piece| Chunk {
                payload: String::from_utf8_lossy(piece).into_owned(),
            })
            .collect()
    }
}
