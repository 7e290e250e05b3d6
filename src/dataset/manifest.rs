//! 学習/検証分割の書き出し
//!
//! 出力ディレクトリ構成:
//! - manifest.json       - 分割結果とクラス一覧
//! - class_mapping.json  - クラスID → クラス名（{"0": "1_dot", ...}）
//! - train.csv / val.csv - path,label,class_name

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::dataset::tile_dataset::TileDataset;

/// マニフェスト内の1サンプル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub label: usize,
}

/// 分割結果のマニフェスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// 学習データのルートディレクトリ
    pub data_dir: String,
    /// クラス名（インデックスがクラスID）
    pub class_names: Vec<String>,
    pub train_ratio: f32,
    pub seed: u64,
    /// 作成時刻（RFC 3339）
    pub created_at: String,
    pub train: Vec<ManifestEntry>,
    pub val: Vec<ManifestEntry>,
}

impl DatasetManifest {
    pub fn new(
        data_dir: &Path,
        train: &TileDataset,
        val: &TileDataset,
        train_ratio: f32,
        seed: u64,
    ) -> Self {
        Self {
            data_dir: data_dir.to_string_lossy().to_string(),
            class_names: train.class_names().to_vec(),
            train_ratio,
            seed,
            created_at: chrono::Local::now().to_rfc3339(),
            train: to_entries(train),
            val: to_entries(val),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize manifest to JSON")
    }

    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize manifest from JSON")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json_string()?)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::from_json_string(&json)
    }
}

fn to_entries(dataset: &TileDataset) -> Vec<ManifestEntry> {
    dataset
        .samples()
        .iter()
        .map(|s| ManifestEntry {
            path: s.path.to_string_lossy().to_string(),
            label: s.label,
        })
        .collect()
}

/// クラスID → クラス名の対応表をJSONで保存
pub fn write_class_mapping(path: &Path, dataset: &TileDataset) -> Result<()> {
    // 整数キーのBTreeMapはID順に {"0": ..., "1": ...} として直列化される
    let json = serde_json::to_string_pretty(&dataset.class_mapping())?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write class mapping: {}", path.display()))
}

/// サンプル一覧をCSVで保存
pub fn write_split_csv(path: &Path, dataset: &TileDataset) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV: {}", path.display()))?;
    writer.write_record(["path", "label", "class_name"])?;
    for sample in dataset.samples() {
        let class_name = dataset
            .class_names()
            .get(sample.label)
            .map(String::as_str)
            .unwrap_or("");
        let path = sample.path.to_string_lossy();
        let label = sample.label.to_string();
        writer.write_record([&*path, label.as_str(), class_name])?;
    }
    writer.flush()?;
    Ok(())
}

/// 書き出したファイルのパス
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub manifest_path: PathBuf,
    pub class_mapping_path: PathBuf,
    pub train_csv_path: PathBuf,
    pub val_csv_path: PathBuf,
    pub num_classes: usize,
    pub train_len: usize,
    pub val_len: usize,
}

/// データセットを読み込み、分割して出力ディレクトリに書き出す
pub fn prepare_dataset(
    data_dir: &Path,
    output_dir: &Path,
    config: &AppConfig,
) -> Result<PreparedDataset> {
    let dataset = TileDataset::from_directory(
        data_dir,
        &config.resolver.image_extensions,
        config.resolver.hidden_prefix,
    )?;
    let num_classes = dataset.num_classes();
    let (train, val) = dataset.split(config.split.train_ratio, config.split.seed);

    tracing::info!("学習データ: {} 枚", train.len());
    tracing::info!("検証データ: {} 枚", val.len());

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let manifest = DatasetManifest::new(
        data_dir,
        &train,
        &val,
        config.split.train_ratio,
        config.split.seed,
    );
    let prepared = PreparedDataset {
        manifest_path: output_dir.join("manifest.json"),
        class_mapping_path: output_dir.join("class_mapping.json"),
        train_csv_path: output_dir.join("train.csv"),
        val_csv_path: output_dir.join("val.csv"),
        num_classes,
        train_len: train.len(),
        val_len: val.len(),
    };

    manifest.save(&prepared.manifest_path)?;
    write_class_mapping(&prepared.class_mapping_path, &train)?;
    write_split_csv(&prepared.train_csv_path, &train)?;
    write_split_csv(&prepared.val_csv_path, &val)?;

    Ok(prepared)
}
