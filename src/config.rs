//! アプリケーション設定管理モジュール
//!
//! データセット探索の候補パスや分割設定などをJSON形式で保存・読み込みします。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// データセット探索設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// 優先順に試す候補パス（データセットルートからの相対パス、"." はルート自身）
    pub candidates: Vec<String>,
    /// クラスフォルダとみなすために必要な最小サブフォルダ数
    pub min_subfolders: usize,
    /// 画像として扱う拡張子（ドットなし、大文字小文字は区別しない）
    pub image_extensions: Vec<String>,
    /// 隠しエントリを示す先頭文字
    pub hidden_prefix: char,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            candidates: vec![
                "tiles".to_string(),
                "Tiles".to_string(),
                "images".to_string(),
                "data".to_string(),
                ".".to_string(),
            ],
            min_subfolders: 10,
            image_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            hidden_prefix: '.',
        }
    }
}

/// 学習/検証データ分割設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    /// トレーニングデータの割合
    pub train_ratio: f32,
    /// ランダムシード
    pub seed: u64,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            seed: 42,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// データセット探索設定
    pub resolver: ResolverSettings,
    /// 分割設定
    pub split: SplitSettings,
    /// 分割結果の出力ディレクトリ
    pub output_dir: Option<String>,
    /// 最後に解決したデータセットディレクトリ
    pub last_data_dir: Option<String>,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("mahjong_trainer.json")
    }

    /// 出力ディレクトリ（未設定なら `prepared`）
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("prepared"))
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                tracing::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "設定ファイルの読み込みに失敗しました ({}): {:#}。デフォルト設定を使用します",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// 最後に解決したデータセットディレクトリを更新
    pub fn update_last_data_dir<P: AsRef<Path>>(&mut self, path: P) {
        self.last_data_dir = Some(path.as_ref().to_string_lossy().to_string());
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("候補パス: {}", self.resolver.candidates.join(", "));
        println!("最小クラス数: {}", self.resolver.min_subfolders);
        println!("画像拡張子: {}", self.resolver.image_extensions.join(", "));
        println!("隠しエントリ接頭辞: {:?}", self.resolver.hidden_prefix);
        println!("\n--- 分割設定 ---");
        println!("学習データ割合: {}", self.split.train_ratio);
        println!("シード: {}", self.split.seed);
        println!("\n出力ディレクトリ: {}", self.output_dir().display());
        if let Some(ref dir) = self.last_data_dir {
            println!("最後に使用したデータセット: {}", dir);
        }
        println!("========================\n");
    }
}
