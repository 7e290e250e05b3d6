//! クラスフォルダ構成の画像データセット

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::dataset::resolver::{has_image_extension, is_hidden, normalize_extensions};

/// データセットアイテム（画像パスとクラスID）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileSample {
    pub path: PathBuf,
    pub label: usize,
}

/// 隠しフォルダを除いた直下のクラスフォルダ名（名前順）
///
/// `hidden_prefix` は探索時と同じ値を渡すこと（クラス数が検出結果と一致する）。
pub fn class_folder_names(data_dir: &Path, hidden_prefix: char) -> Result<Vec<String>> {
    let mut class_names = Vec::new();
    for entry in std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read data directory: {}", data_dir.display()))?
    {
        let entry = entry?;
        if is_hidden(&entry.file_name(), hidden_prefix) || !entry.path().is_dir() {
            continue;
        }
        class_names.push(entry.file_name().to_string_lossy().to_string());
    }
    class_names.sort();
    Ok(class_names)
}

/// 学習データセット（パスのリストのみ保持）
#[derive(Clone, Debug)]
pub struct TileDataset {
    samples: Vec<TileSample>,
    class_names: Vec<String>,
}

impl TileDataset {
    /// ディレクトリから学習データを読み込む
    ///
    /// クラスIDは隠しフォルダを除いたサブフォルダの名前順で割り当てる。
    pub fn from_directory<S: AsRef<str>>(
        data_dir: &Path,
        extensions: &[S],
        hidden_prefix: char,
    ) -> Result<Self> {
        let class_names = class_folder_names(data_dir, hidden_prefix)?;
        let dataset = Self::from_directory_with_order(data_dir, &class_names, extensions)?;
        if dataset.is_empty() {
            anyhow::bail!("No training samples found in {}", data_dir.display());
        }
        Ok(dataset)
    }

    /// 指定された順序でディレクトリから学習データを読み込む
    pub fn from_directory_with_order<S: AsRef<str>>(
        data_dir: &Path,
        class_order: &[String],
        extensions: &[S],
    ) -> Result<Self> {
        let extensions = normalize_extensions(extensions);
        let mut samples = Vec::new();

        for (class_id, class_name) in class_order.iter().enumerate() {
            let class_dir = data_dir.join(class_name);
            if !class_dir.is_dir() {
                tracing::warn!("クラスディレクトリが存在しません: {}", class_dir.display());
                continue;
            }

            let mut paths = Vec::new();
            let entries = std::fs::read_dir(&class_dir).with_context(|| {
                format!("Failed to read class directory: {}", class_dir.display())
            })?;
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && has_image_extension(&path, &extensions) {
                    paths.push(path);
                }
            }
            paths.sort();
            samples.extend(paths.into_iter().map(|path| TileSample { path, label: class_id }));
        }

        tracing::debug!(
            "Loaded {} samples from {} classes",
            samples.len(),
            class_order.len()
        );

        Ok(Self {
            samples,
            class_names: class_order.to_vec(),
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn samples(&self) -> &[TileSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TileSample> {
        self.samples.get(index)
    }

    /// クラス名ごとのサンプル数（クラスID順）
    pub fn class_counts(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.class_names.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        self.class_names.iter().cloned().zip(counts).collect()
    }

    /// クラスID → クラス名の対応表
    pub fn class_mapping(&self) -> BTreeMap<usize, String> {
        self.class_names.iter().cloned().enumerate().collect()
    }

    /// データセットを学習用と検証用に分割
    ///
    /// クラスごとにシャッフルしてから先頭 `floor(n * train_ratio)` 枚を学習用にするため、
    /// 各クラスの比率が両方のデータセットで保たれる。
    pub fn split(self, train_ratio: f32, seed: u64) -> (Self, Self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let train_ratio = train_ratio.clamp(0.0, 1.0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

        let mut by_class: Vec<Vec<TileSample>> = vec![Vec::new(); self.class_names.len()];
        for sample in self.samples {
            by_class[sample.label].push(sample);
        }

        let mut train_samples = Vec::new();
        let mut val_samples = Vec::new();
        for mut class_samples in by_class {
            class_samples.shuffle(&mut rng);
            let train_len = (class_samples.len() as f32 * train_ratio) as usize;
            let val_part = class_samples.split_off(train_len);
            train_samples.extend(class_samples);
            val_samples.extend(val_part);
        }

        let train = Self {
            samples: train_samples,
            class_names: self.class_names.clone(),
        };
        let val = Self {
            samples: val_samples,
            class_names: self.class_names,
        };
        (train, val)
    }
}
