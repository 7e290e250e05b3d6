//! データセットディレクトリの自動検出
//!
//! 展開済みアーカイブの中から、直下にクラスフォルダ（ラベル名のフォルダに画像が入ったもの）を
//! 持つディレクトリを探します。
//!
//! 判定基準（viability）:
//! - 隠しエントリを除いたサブフォルダ数が `min_subfolders` 以上
//! - 名前順で最初のサブフォルダ1つに、対象拡張子の画像ファイルが1枚以上ある
//!
//! 画像チェックは代表フォルダ1つのみを見るヒューリスティックです。
//! 代表フォルダだけが空（または代表フォルダだけに画像がある）場合は誤判定しますが、
//! 全クラスフォルダの走査は行いません。

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::ResolverSettings;

/// ルートディレクトリ自身を表す候補パス
const ROOT_CANDIDATE: &str = ".";

/// データセット探索のエラー
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// 条件を満たすディレクトリが見つからなかった
    #[error(
        "No directory with class folders found under {} (candidates tried: {})",
        .root.display(),
        display_candidates(.candidates)
    )]
    NotFound {
        root: PathBuf,
        candidates: Vec<PathBuf>,
    },
    /// ディレクトリを読み込めなかった（探索中はスキップされる）
    #[error("Failed to read directory {path}: {source}")]
    Access {
        path: PathBuf,
        source: io::Error,
    },
}

fn display_candidates(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return "none".to_string();
    }
    candidates
        .iter()
        .map(|c| c.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 探索設定
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// 優先順の候補パス（ルートからの相対パス）
    pub candidates: Vec<PathBuf>,
    /// 必要な最小サブフォルダ数
    pub min_subfolders: usize,
    /// 画像拡張子（小文字、ドットなし）
    pub image_extensions: Vec<String>,
    /// 隠しエントリの先頭文字
    pub hidden_prefix: char,
}

impl ResolverConfig {
    pub fn new<I, S>(candidates: I, min_subfolders: usize, image_extensions: &[S]) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
        S: AsRef<str>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            min_subfolders,
            image_extensions: normalize_extensions(image_extensions),
            hidden_prefix: '.',
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::from(&ResolverSettings::default())
    }
}

impl From<&ResolverSettings> for ResolverConfig {
    fn from(settings: &ResolverSettings) -> Self {
        Self {
            candidates: settings.candidates.iter().map(PathBuf::from).collect(),
            min_subfolders: settings.min_subfolders,
            image_extensions: normalize_extensions(&settings.image_extensions),
            hidden_prefix: settings.hidden_prefix,
        }
    }
}

/// 拡張子を小文字・ドットなしに揃える
pub fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// パスの拡張子が対象拡張子に含まれるか（大文字小文字は区別しない）
pub fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

/// 探索戦略（先頭から順に評価し、最初に成功したものを採用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStrategy {
    /// ルートからの相対パスを1つ調べる
    Candidate(PathBuf),
    /// ルート以下を再帰的に走査する
    RecursiveWalk,
}

/// データセットディレクトリ検出器
#[derive(Debug, Clone)]
pub struct DatasetResolver {
    config: ResolverConfig,
}

impl DatasetResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// 評価順の探索戦略一覧
    pub fn strategies(&self) -> Vec<SearchStrategy> {
        self.config
            .candidates
            .iter()
            .cloned()
            .map(SearchStrategy::Candidate)
            .chain(std::iter::once(SearchStrategy::RecursiveWalk))
            .collect()
    }

    /// 学習データのルートディレクトリ（絶対パス）を返す
    pub fn resolve(&self, root: &Path) -> Result<PathBuf, ResolveError> {
        let root = absolute_root(root);
        tracing::debug!("データセットを探索します: {}", root.display());

        let found = self
            .strategies()
            .iter()
            .find_map(|strategy| self.try_strategy(&root, strategy));

        match found {
            Some(dir) => {
                tracing::info!("データディレクトリを検出しました: {}", dir.display());
                Ok(dir)
            }
            None => Err(ResolveError::NotFound {
                root,
                candidates: self.config.candidates.clone(),
            }),
        }
    }

    fn try_strategy(&self, root: &Path, strategy: &SearchStrategy) -> Option<PathBuf> {
        match strategy {
            SearchStrategy::Candidate(relative) => {
                let dir = candidate_path(root, relative);
                if !dir.is_dir() {
                    tracing::debug!("候補が存在しません: {}", dir.display());
                    return None;
                }
                self.viable_or_skip(&dir).then_some(dir)
            }
            SearchStrategy::RecursiveWalk => {
                tracing::debug!(
                    "候補に該当なし。{} 以下を再帰的に走査します",
                    root.display()
                );
                self.walk(root)
            }
        }
    }

    fn walk(&self, root: &Path) -> Option<PathBuf> {
        let hidden_prefix = self.config.hidden_prefix;
        WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                entry.depth() == 0 || !is_hidden(entry.file_name(), hidden_prefix)
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("走査中に読み込めないエントリをスキップしました: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .find(|dir| self.viable_or_skip(dir))
    }

    /// 判定中の読み込みエラーは「条件を満たさない」として扱う
    fn viable_or_skip(&self, dir: &Path) -> bool {
        match self.is_viable(dir) {
            Ok(viable) => viable,
            Err(e) => {
                tracing::warn!("{}。このディレクトリをスキップします", e);
                false
            }
        }
    }

    /// ディレクトリがクラスフォルダ群を直下に持つか判定する
    pub fn is_viable(&self, dir: &Path) -> Result<bool, ResolveError> {
        let class_folders = self.class_folders(dir)?;
        if class_folders.len() < self.config.min_subfolders {
            return Ok(false);
        }
        let Some(sample) = class_folders.first() else {
            return Ok(false);
        };
        let has_images = self.contains_image(sample)?;
        if has_images {
            tracing::debug!(
                "{}: {} クラス（代表: {}）",
                dir.display(),
                class_folders.len(),
                sample.display()
            );
        }
        Ok(has_images)
    }

    /// 隠しエントリを除いた直下のサブフォルダ（名前順）
    pub fn class_folders(&self, dir: &Path) -> Result<Vec<PathBuf>, ResolveError> {
        let access = |source| ResolveError::Access {
            path: dir.to_path_buf(),
            source,
        };
        let mut folders = Vec::new();
        for entry in fs::read_dir(dir).map_err(access)? {
            let entry = entry.map_err(access)?;
            if is_hidden(&entry.file_name(), self.config.hidden_prefix) {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                folders.push(path);
            }
        }
        folders.sort();
        Ok(folders)
    }

    fn contains_image(&self, dir: &Path) -> Result<bool, ResolveError> {
        let access = |source| ResolveError::Access {
            path: dir.to_path_buf(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(access)? {
            let path = entry.map_err(access)?.path();
            if path.is_file() && has_image_extension(&path, &self.config.image_extensions) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// 候補リスト・閾値・拡張子を直接指定して探索する
pub fn resolve<S: AsRef<str>>(
    root: &Path,
    candidates: &[PathBuf],
    min_subfolders: usize,
    image_extensions: &[S],
) -> Result<PathBuf, ResolveError> {
    let config = ResolverConfig::new(candidates.iter().cloned(), min_subfolders, image_extensions);
    DatasetResolver::new(config).resolve(root)
}

/// 名前が隠しエントリの接頭辞で始まるか
pub fn is_hidden(name: &OsStr, prefix: char) -> bool {
    name.to_string_lossy().starts_with(prefix)
}

fn candidate_path(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() || relative == Path::new(ROOT_CANDIDATE) {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn absolute_root(root: &Path) -> PathBuf {
    fs::canonicalize(root).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(root))
            .unwrap_or_else(|_| root.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_classes(dir: &Path, count: usize, file_name: &str) {
        for i in 0..count {
            let class_dir = dir.join(format!("class_{:02}", i));
            fs::create_dir_all(&class_dir).unwrap();
            fs::write(class_dir.join(file_name), b"").unwrap();
        }
    }

    fn default_resolver(min_subfolders: usize) -> DatasetResolver {
        DatasetResolver::new(ResolverConfig::new(
            ["tiles", "Tiles", "images", "data", "."],
            min_subfolders,
            &["jpg", "jpeg", "png"],
        ))
    }

    fn canonical(path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap()
    }

    #[test]
    fn resolves_tiles_candidate_with_34_classes() {
        let root = TempDir::new().unwrap();
        make_classes(&root.path().join("tiles"), 34, "tile.jpg");

        let resolved = default_resolver(10).resolve(root.path()).unwrap();
        assert_eq!(resolved, canonical(&root.path().join("tiles")));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn empty_tree_is_not_found() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("tiles/only_one")).unwrap();

        let err = default_resolver(10).resolve(root.path()).unwrap_err();
        match err {
            ResolveError::NotFound { root: searched, candidates } => {
                assert_eq!(searched, canonical(root.path()));
                assert_eq!(candidates.len(), 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn not_found_message_lists_root_and_candidates() {
        let root = TempDir::new().unwrap();
        let err = default_resolver(10).resolve(root.path()).unwrap_err();
        let message = err.to_string();

        assert!(message.contains(&canonical(root.path()).display().to_string()));
        assert!(message.contains("tiles, Tiles, images, data, ."));
    }

    #[test]
    fn first_candidate_wins_over_later_ones() {
        let root = TempDir::new().unwrap();
        make_classes(&root.path().join("images"), 40, "a.png");
        make_classes(&root.path().join("tiles"), 12, "a.jpg");

        let resolved = default_resolver(10).resolve(root.path()).unwrap();
        assert_eq!(resolved, canonical(&root.path().join("tiles")));
    }

    #[test]
    fn hidden_directories_are_not_counted() {
        let root = TempDir::new().unwrap();
        let tiles = root.path().join("tiles");
        make_classes(&tiles, 9, "a.jpg");
        for name in [".cache", ".git"] {
            fs::create_dir_all(tiles.join(name)).unwrap();
            fs::write(tiles.join(name).join("x.jpg"), b"").unwrap();
        }

        assert!(!default_resolver(10).is_viable(&tiles).unwrap());
        assert!(default_resolver(10).resolve(root.path()).is_err());
    }

    #[test]
    fn threshold_boundary() {
        let root = TempDir::new().unwrap();
        let below = root.path().join("below");
        let exact = root.path().join("exact");
        make_classes(&below, 9, "a.jpg");
        make_classes(&exact, 10, "a.jpg");

        let resolver = default_resolver(10);
        assert!(!resolver.is_viable(&below).unwrap());
        assert!(resolver.is_viable(&exact).unwrap());
    }

    #[test]
    fn resolve_is_idempotent() {
        let root = TempDir::new().unwrap();
        make_classes(&root.path().join("nested/deeper/set_b"), 15, "a.jpeg");
        make_classes(&root.path().join("nested/deeper/set_a"), 15, "a.jpeg");

        let resolver = default_resolver(10);
        let first = resolver.resolve(root.path()).unwrap();
        let second = resolver.resolve(root.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, canonical(&root.path().join("nested/deeper/set_a")));
    }

    #[test]
    fn falls_back_to_recursive_walk() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("mahjong-tiles-v2/train");
        make_classes(&nested, 11, "img.PNG");

        let resolved = default_resolver(10).resolve(root.path()).unwrap();
        assert_eq!(resolved, canonical(&nested));
    }

    #[test]
    fn walk_skips_hidden_subtrees() {
        let root = TempDir::new().unwrap();
        make_classes(&root.path().join(".trash/old"), 20, "a.jpg");

        assert!(default_resolver(10).resolve(root.path()).is_err());
    }

    #[test]
    fn only_the_first_class_folder_is_sampled() {
        let root = TempDir::new().unwrap();
        let tiles = root.path().join("tiles");
        make_classes(&tiles, 12, "a.jpg");
        // 名前順で先頭に来る空フォルダが代表になる
        fs::create_dir_all(tiles.join("aaa_empty")).unwrap();

        let resolver = default_resolver(10);
        assert!(!resolver.is_viable(&tiles).unwrap());
    }

    #[test]
    fn non_image_files_do_not_qualify() {
        let root = TempDir::new().unwrap();
        make_classes(&root.path().join("tiles"), 12, "notes.txt");

        assert!(default_resolver(10).resolve(root.path()).is_err());
    }

    #[test]
    fn root_itself_can_be_the_data_dir() {
        let root = TempDir::new().unwrap();
        make_classes(root.path(), 10, "a.jpg");

        let resolved = default_resolver(10).resolve(root.path()).unwrap();
        assert_eq!(resolved, canonical(root.path()));
    }

    #[test]
    fn missing_root_is_not_found() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("does_not_exist");

        let err = default_resolver(10).resolve(&missing).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn unreadable_directory_reports_access_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("gone");

        let err = default_resolver(10).class_folders(&missing).unwrap_err();
        assert!(matches!(err, ResolveError::Access { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_candidate_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let tiles = root.path().join("tiles");
        make_classes(&tiles, 12, "a.jpg");
        make_classes(&root.path().join("images"), 12, "a.jpg");

        // 代表フォルダを読めなくする
        let locked = tiles.join("class_00");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // root 権限では権限を外しても読めるため検証できない
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let resolver = default_resolver(10);
        let access = resolver.is_viable(&tiles);
        let resolved = resolver.resolve(root.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(access, Err(ResolveError::Access { .. })));
        assert_eq!(resolved.unwrap(), canonical(&root.path().join("images")));
    }

    #[test]
    fn free_function_accepts_dotted_extensions() {
        let root = TempDir::new().unwrap();
        make_classes(&root.path().join("data"), 10, "a.jpg");

        let resolved = resolve(root.path(), &[PathBuf::from("data")], 10, &[".JPG"]).unwrap();
        assert_eq!(resolved, canonical(&root.path().join("data")));
    }

    #[test]
    fn strategies_end_with_walk() {
        let strategies = default_resolver(10).strategies();
        let first = SearchStrategy::Candidate(PathBuf::from("tiles"));
        assert_eq!(strategies.first(), Some(&first));
        assert_eq!(strategies.last(), Some(&SearchStrategy::RecursiveWalk));
        assert_eq!(strategies.len(), 6);
    }
}
