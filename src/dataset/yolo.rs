//! 物体検出（YOLO形式）データセットの構成検出
//!
//! Roboflow等からエクスポートしたデータセットは `data.yaml` の位置や
//! `images/train` と `train/images` のどちらの構成かが一定しないため、ここで探す。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::dataset::resolver::{has_image_extension, is_hidden, normalize_extensions};

/// 分割名の候補
const SPLIT_NAMES: [&str; 4] = ["train", "valid", "val", "test"];

/// 検出した分割（train/val/test）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YoloSplit {
    pub name: String,
    pub images_dir: PathBuf,
    pub labels_dir: Option<PathBuf>,
    pub image_count: usize,
    pub label_count: usize,
}

/// クラス名の記述形式（リスト / ID→名前のマップ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassNames {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

/// data.yaml の内容（学習に必要なキーのみ）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// データセットのルート
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub train: Option<String>,
    #[serde(default)]
    pub val: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
    /// クラス数
    #[serde(default)]
    pub nc: Option<usize>,
    #[serde(default)]
    pub names: Option<ClassNames>,
}

impl DataConfig {
    /// クラスID順のクラス名
    pub fn class_names(&self) -> Vec<String> {
        match &self.names {
            Some(ClassNames::List(names)) => names.clone(),
            Some(ClassNames::Map(names)) => names.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// `nc` がなければ names の数を使う
    pub fn num_classes(&self) -> usize {
        self.nc.unwrap_or_else(|| self.class_names().len())
    }
}

fn visible_files(root: &Path, hidden_prefix: char) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| e.depth() == 0 || !is_hidden(e.file_name(), hidden_prefix))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("走査中に読み込めないエントリをスキップしました: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
}

/// データセット設定ファイル（data.yaml）を探す
///
/// 名前順の再帰走査で最初に見つかった `data.yaml` を優先し、
/// なければ最初の `*.yaml` / `*.yml` を返す。
pub fn locate_data_yaml(root: &Path, hidden_prefix: char) -> Result<PathBuf> {
    let mut fallback = None;
    for entry in visible_files(root, hidden_prefix) {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name == "data.yaml" {
            return Ok(entry.into_path());
        }
        if fallback.is_none() && (name.ends_with(".yaml") || name.ends_with(".yml")) {
            fallback = Some(entry.into_path());
        }
    }
    fallback.ok_or_else(|| anyhow::anyhow!("Could not find data.yaml under {}", root.display()))
}

/// data.yaml を読み込む
pub fn read_data_config(yaml: &Path) -> Result<DataConfig> {
    let text = fs::read_to_string(yaml)
        .with_context(|| format!("Failed to read {}", yaml.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("Failed to parse {}", yaml.display()))
}

/// data.yaml の `path` を、ファイルのあるディレクトリの絶対パスに書き換える
///
/// エクスポート元の絶対パスが残っていると学習時に画像が見つからないため。
/// 他のキーはそのまま残す（コメントは失われる）。書き換え後のデータセットディレクトリを返す。
pub fn fix_data_yaml_path(yaml: &Path) -> Result<PathBuf> {
    let yaml = fs::canonicalize(yaml)
        .with_context(|| format!("Failed to resolve {}", yaml.display()))?;
    let dataset_dir = yaml
        .parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("{} has no parent directory", yaml.display()))?;

    let text = fs::read_to_string(&yaml)
        .with_context(|| format!("Failed to read {}", yaml.display()))?;
    let mut value: serde_yaml::Value = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse {}", yaml.display()))?;
    if value.is_null() {
        value = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }
    let mapping = value
        .as_mapping_mut()
        .with_context(|| format!("{} is not a YAML mapping", yaml.display()))?;
    mapping.insert(
        serde_yaml::Value::from("path"),
        serde_yaml::Value::from(dataset_dir.to_string_lossy().to_string()),
    );

    fs::write(&yaml, serde_yaml::to_string(&value)?)
        .with_context(|| format!("Failed to write {}", yaml.display()))?;
    tracing::info!("data.yaml の path を更新しました: {}", dataset_dir.display());
    Ok(dataset_dir)
}

/// データセットディレクトリ内の分割構成を検出する
///
/// `images/<split>` + `labels/<split>` と `<split>/images` + `<split>/labels` の両方に対応。
pub fn detect_splits<S: AsRef<str>>(
    dataset_dir: &Path,
    extensions: &[S],
    hidden_prefix: char,
) -> Vec<YoloSplit> {
    let extensions = normalize_extensions(extensions);
    let mut splits = Vec::new();

    for name in SPLIT_NAMES {
        let layouts = [
            (
                dataset_dir.join("images").join(name),
                dataset_dir.join("labels").join(name),
            ),
            (
                dataset_dir.join(name).join("images"),
                dataset_dir.join(name).join("labels"),
            ),
        ];
        let found = layouts.into_iter().find(|(images, _)| images.is_dir());
        let Some((images_dir, labels_dir)) = found else {
            continue;
        };

        let image_count = visible_files(&images_dir, hidden_prefix)
            .filter(|e| has_image_extension(e.path(), &extensions))
            .count();
        let (labels_dir, label_count) = if labels_dir.is_dir() {
            let count = visible_files(&labels_dir, hidden_prefix)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "txt"))
                .count();
            (Some(labels_dir), count)
        } else {
            (None, 0)
        };

        splits.push(YoloSplit {
            name: name.to_string(),
            images_dir,
            labels_dir,
            image_count,
            label_count,
        });
    }

    splits
}

/// data.yaml のクラス情報をコンソールに表示
pub fn print_data_config(config: &DataConfig) {
    if let Some(path) = &config.path {
        println!("path: {}", path);
    }
    println!("クラス数: {}", config.num_classes());
    for (i, name) in config.class_names().iter().enumerate() {
        println!("  Class {}: {}", i, name);
    }
}

/// 分割構成をコンソールに表示
pub fn print_splits(splits: &[YoloSplit]) {
    if splits.is_empty() {
        println!("分割構成が見つかりません");
        return;
    }
    for split in splits {
        println!(
            "  {}: 画像 {} 枚, ラベル {} 件 ({})",
            split.name,
            split.image_count,
            split.label_count,
            split.images_dir.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn prefers_data_yaml_over_other_yaml() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("a_export/config.yaml"));
        touch(&root.path().join("mahjong-1/data.yaml"));

        let found = locate_data_yaml(root.path(), '.').unwrap();
        assert_eq!(found, root.path().join("mahjong-1/data.yaml"));
    }

    #[test]
    fn falls_back_to_first_yaml() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("export/dataset.yml"));
        touch(&root.path().join(".cache/data.yaml"));

        let found = locate_data_yaml(root.path(), '.').unwrap();
        assert_eq!(found, root.path().join("export/dataset.yml"));
    }

    #[test]
    fn missing_yaml_is_an_error() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("images/train/a.jpg"));

        assert!(locate_data_yaml(root.path(), '.').is_err());
    }

    #[test]
    fn detects_both_split_layouts() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("train/images/a.jpg"));
        touch(&root.path().join("train/images/b.jpg"));
        touch(&root.path().join("train/labels/a.txt"));
        touch(&root.path().join("images/val/c.png"));

        let splits = detect_splits(root.path(), &["jpg", "png"], '.');
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].name, "train");
        assert_eq!(splits[0].image_count, 2);
        assert_eq!(splits[0].label_count, 1);
        assert_eq!(splits[1].name, "val");
        assert_eq!(splits[1].labels_dir, None);
    }

    #[test]
    fn reads_names_as_list_or_map() {
        let root = TempDir::new().unwrap();
        let list = root.path().join("list.yaml");
        fs::write(&list, "train: train/images\nnc: 2\nnames: ['1_dot', 'east']\n").unwrap();
        let map = root.path().join("map.yaml");
        fs::write(
            &map,
            "path: ./mahjong_dataset\nnames:\n  0: 1_dot\n  1: 2_dot\n  2: east\n",
        )
        .unwrap();

        let list = read_data_config(&list).unwrap();
        assert_eq!(list.class_names(), vec!["1_dot".to_string(), "east".to_string()]);
        assert_eq!(list.num_classes(), 2);

        let map = read_data_config(&map).unwrap();
        assert_eq!(map.path.as_deref(), Some("./mahjong_dataset"));
        assert_eq!(map.num_classes(), 3);
        assert_eq!(map.class_names()[2], "east");
    }

    #[test]
    fn fix_path_points_at_yaml_directory_and_keeps_other_keys() {
        let root = TempDir::new().unwrap();
        let yaml = root.path().join("mahjong-1/data.yaml");
        fs::create_dir_all(yaml.parent().unwrap()).unwrap();
        let original = "\
path: /content/datasets/mahjong-1
train: train/images
val: valid/images
nc: 2
names: ['1_dot', 'east']
roboflow:
  version: 3
";
        fs::write(&yaml, original).unwrap();

        let dataset_dir = fix_data_yaml_path(&yaml).unwrap();
        assert_eq!(dataset_dir, fs::canonicalize(root.path().join("mahjong-1")).unwrap());

        let config = read_data_config(&yaml).unwrap();
        assert_eq!(config.path, Some(dataset_dir.to_string_lossy().to_string()));
        assert_eq!(config.train.as_deref(), Some("train/images"));
        assert_eq!(config.val.as_deref(), Some("valid/images"));
        assert_eq!(config.class_names(), vec!["1_dot".to_string(), "east".to_string()]);

        let text = fs::read_to_string(&yaml).unwrap();
        let raw: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(raw["roboflow"]["version"], serde_yaml::Value::from(3));
    }

    #[test]
    fn fix_path_adds_missing_key() {
        let root = TempDir::new().unwrap();
        let yaml = root.path().join("data.yaml");
        fs::write(&yaml, "train: images/train\n").unwrap();

        fix_data_yaml_path(&yaml).unwrap();
        let config = read_data_config(&yaml).unwrap();
        assert!(config.path.is_some());
        assert_eq!(config.train.as_deref(), Some("images/train"));
    }

    #[test]
    fn custom_hidden_prefix_skips_folders() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("_backup/data.yaml"));
        touch(&root.path().join("export/data.yaml"));

        let found = locate_data_yaml(root.path(), '_').unwrap();
        assert_eq!(found, root.path().join("export/data.yaml"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_folder_does_not_stop_the_search() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let locked = root.path().join("a_locked");
        touch(&locked.join("notes.txt"));
        touch(&root.path().join("b_export/data.yaml"));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }
        let found = locate_data_yaml(root.path(), '.');
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(found.unwrap(), root.path().join("b_export/data.yaml"));
    }
}
