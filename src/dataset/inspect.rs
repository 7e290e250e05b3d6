//! データセットの検証とサマリー表示
//!
//! 各クラスの画像枚数と、先頭画像1枚の解像度を調べる（効率化のため1枚のみ）。

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::dataset::tile_dataset::{class_folder_names, TileDataset};

/// クラスごとの検証結果
#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub name: String,
    pub image_count: usize,
    /// 先頭画像の (幅, 高さ)。読み込めなかった場合は None
    pub sample_dimensions: Option<(u32, u32)>,
}

/// データセット全体の検証結果
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub data_dir: PathBuf,
    pub classes: Vec<ClassReport>,
    pub empty_classes: Vec<String>,
    pub unreadable_samples: Vec<PathBuf>,
}

impl DatasetReport {
    pub fn total_images(&self) -> usize {
        self.classes.iter().map(|c| c.image_count).sum()
    }

    pub fn is_valid(&self) -> bool {
        self.empty_classes.is_empty() && self.unreadable_samples.is_empty()
    }

    /// サマリーをコンソールに表示
    pub fn print_summary(&self) {
        println!("\n=== データセット ===");
        println!("ディレクトリ: {}", self.data_dir.display());
        println!("クラス数: {}", self.classes.len());
        println!("画像枚数: {}", self.total_images());
        for (i, class) in self.classes.iter().enumerate() {
            match class.sample_dimensions {
                Some((w, h)) => println!(
                    "  Class {}: {} ({} 枚, {}x{})",
                    i, class.name, class.image_count, w, h
                ),
                None => println!("  Class {}: {} ({} 枚)", i, class.name, class.image_count),
            }
        }
        if !self.empty_classes.is_empty() {
            println!("画像のないクラス: {}", self.empty_classes.join(", "));
        }
        for path in &self.unreadable_samples {
            println!("読み込めない画像: {}", path.display());
        }
        println!("====================");
    }
}

/// データディレクトリを検証する
pub fn inspect<S: AsRef<str>>(
    data_dir: &Path,
    extensions: &[S],
    hidden_prefix: char,
) -> Result<DatasetReport> {
    let class_names = class_folder_names(data_dir, hidden_prefix)?;
    let dataset = TileDataset::from_directory_with_order(data_dir, &class_names, extensions)?;

    let mut classes = Vec::with_capacity(class_names.len());
    let mut empty_classes = Vec::new();
    let mut unreadable_samples = Vec::new();

    for (label, (name, image_count)) in dataset.class_counts().into_iter().enumerate() {
        let first = dataset.samples().iter().find(|s| s.label == label);
        let sample_dimensions = match first {
            Some(sample) => match image::image_dimensions(&sample.path) {
                Ok(dims) => Some(dims),
                Err(e) => {
                    tracing::warn!("画像読み込み失敗: {} - {}", sample.path.display(), e);
                    unreadable_samples.push(sample.path.clone());
                    None
                }
            },
            None => None,
        };
        if image_count == 0 {
            empty_classes.push(name.clone());
        }
        classes.push(ClassReport {
            name,
            image_count,
            sample_dimensions,
        });
    }

    Ok(DatasetReport {
        data_dir: data_dir.to_path_buf(),
        classes,
        empty_classes,
        unreadable_samples,
    })
}
