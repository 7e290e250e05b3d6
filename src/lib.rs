//! 麻雀牌画像データセットの準備ツール
//!
//! ダウンロード・展開済みのデータセットから学習データのルート（クラスフォルダ群の親）を
//! 検出し、学習/検証への分割やクラス対応表の書き出しを行います。

pub mod config;
pub mod dataset;
pub mod logging;

pub use config::AppConfig;
pub use dataset::{DatasetResolver, ResolveError, ResolverConfig};
