//! ライセンスキー生成
//!
//! 62文字の英数字アルファベットから一様にキーを生成する。乱数源はジェネレータ
//! インスタンスが所有し、テストではシード固定で決定的に生成できる。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// キーに使用する文字集合（62文字）
pub const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// デフォルトのキー長
pub const DEFAULT_KEY_LENGTH: usize = 10;

/// ライセンスキー生成器
pub trait KeyGenerator: Send + Sync {
    /// 新しいキー候補を1つ生成
    fn generate(&self) -> String;
}

/// 擬似乱数によるキー生成器（暗号学的強度は不要）
pub struct RandomKeyGenerator {
    rng: Mutex<StdRng>,
    length: usize,
}

impl RandomKeyGenerator {
    /// エントロピーから初期化した生成器を作成
    pub fn new(length: usize) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            length,
        }
    }

    /// シード固定の生成器を作成
    pub fn with_seed(length: usize, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            length,
        }
    }
}

impl Default for RandomKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_LENGTH)
    }
}

impl KeyGenerator for RandomKeyGenerator {
    fn generate(&self) -> String {
        // パニックしたスレッドが残した乱数状態でも生成は継続できる
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        (0..self.length)
            .map(|_| {
                let idx = rng.gen_range(0..KEY_ALPHABET.len());
                KEY_ALPHABET[idx] as char
            })
            .collect()
    }
}
