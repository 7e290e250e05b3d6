//! データセット準備ツールのCLI
//!
//! 探索ログは標準エラー、結果は標準出力に出す。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mahjong_trainer_lib::config::AppConfig;
use mahjong_trainer_lib::dataset::{self, DatasetResolver, ResolverConfig};
use mahjong_trainer_lib::logging;

#[derive(Parser)]
#[command(version, about = "Mahjong tile dataset preparation tools", long_about = None)]
struct Cli {
    /// 設定ファイル（JSON）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// デバッグログを出力する
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// 探索設定の上書き
#[derive(clap::Args, Clone, Default)]
struct ResolveArgs {
    /// 候補パス（指定順に試す、ルートからの相対パス）
    #[arg(long = "candidate")]
    candidates: Vec<String>,

    /// 必要な最小クラスフォルダ数
    #[arg(long)]
    min_subfolders: Option<usize>,

    /// 画像拡張子
    #[arg(long = "ext")]
    extensions: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// 学習データのルートディレクトリを検出して表示する
    Resolve {
        root: PathBuf,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// 検出したデータセットのクラス構成を表示する
    Inspect {
        root: PathBuf,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// 学習/検証に分割し、マニフェスト・クラス対応表・CSVを書き出す
    Prepare {
        root: PathBuf,
        /// 出力ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        train_ratio: Option<f32>,
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// アーカイブ（zip / tar.gz / tar）を展開し、学習データのルートを検出する
    Extract {
        archive: PathBuf,
        /// 展開先ディレクトリ
        #[arg(short, long)]
        dest: PathBuf,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// 物体検出データセットの data.yaml と分割構成を表示する
    Yolo {
        root: PathBuf,
        /// data.yaml の path をデータセットの絶対パスに書き換える
        #[arg(long)]
        fix_path: bool,
    },
    /// 設定を表示する（--init でデフォルト設定を書き出す）
    Config {
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("警告: ログの初期化に失敗しました: {}", e);
    }

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_default(&config_path);

    match cli.command {
        Command::Resolve { root, resolve } => {
            apply_overrides(&mut config, &resolve);
            let data_dir = resolve_data_dir(&config, &root)?;
            println!("{}", data_dir.display());
        }
        Command::Inspect { root, resolve } => {
            apply_overrides(&mut config, &resolve);
            let data_dir = resolve_data_dir(&config, &root)?;
            let report = dataset::inspect(
                &data_dir,
                &config.resolver.image_extensions,
                config.resolver.hidden_prefix,
            )?;
            report.print_summary();
            if !report.is_valid() {
                anyhow::bail!("Dataset has empty classes or unreadable images");
            }
        }
        Command::Prepare {
            root,
            output,
            train_ratio,
            seed,
            resolve,
        } => {
            apply_overrides(&mut config, &resolve);
            if let Some(ratio) = train_ratio {
                config.split.train_ratio = ratio;
            }
            if let Some(seed) = seed {
                config.split.seed = seed;
            }
            let data_dir = resolve_data_dir(&config, &root)?;
            let output_dir = output.unwrap_or_else(|| config.output_dir());
            let prepared = dataset::prepare_dataset(&data_dir, &output_dir, &config)?;

            println!("クラス数: {}", prepared.num_classes);
            println!("学習データ: {} 枚", prepared.train_len);
            println!("検証データ: {} 枚", prepared.val_len);
            println!("マニフェスト: {}", prepared.manifest_path.display());
            println!("クラス対応表: {}", prepared.class_mapping_path.display());

            if config_path.exists() {
                config.update_last_data_dir(&data_dir);
                config.save(&config_path)?;
            }
        }
        Command::Extract {
            archive,
            dest,
            resolve,
        } => {
            apply_overrides(&mut config, &resolve);
            let extracted = dataset::extract_archive(&archive, &dest)?;
            let data_dir = resolve_data_dir(&config, &extracted)?;
            println!("{}", data_dir.display());
        }
        Command::Yolo { root, fix_path } => {
            let hidden_prefix = config.resolver.hidden_prefix;
            let yaml = dataset::locate_data_yaml(&root, hidden_prefix)?;
            println!("data.yaml: {}", yaml.display());
            let dataset_dir = if fix_path {
                dataset::fix_data_yaml_path(&yaml)?
            } else {
                yaml.parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| root.clone())
            };

            let data_config = dataset::read_data_config(&yaml)?;
            dataset::yolo::print_data_config(&data_config);
            let splits = dataset::detect_splits(
                &dataset_dir,
                &config.resolver.image_extensions,
                hidden_prefix,
            );
            dataset::yolo::print_splits(&splits);
        }
        Command::Config { init } => {
            if init {
                config.save(&config_path)?;
                println!("設定ファイルを保存しました: {}", config_path.display());
            }
            config.display();
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &ResolveArgs) {
    if !args.candidates.is_empty() {
        config.resolver.candidates = args.candidates.clone();
    }
    if let Some(min) = args.min_subfolders {
        config.resolver.min_subfolders = min;
    }
    if !args.extensions.is_empty() {
        config.resolver.image_extensions = args.extensions.clone();
    }
}

/// 検出に失敗した場合は学習を続行できないため、候補一覧付きのエラーで終了する
fn resolve_data_dir(config: &AppConfig, root: &Path) -> Result<PathBuf> {
    let resolver = DatasetResolver::new(ResolverConfig::from(&config.resolver));
    resolver.resolve(root).with_context(|| {
        format!(
            "Could not locate the training data directory; \
             pass the correct path with --candidate (searched {})",
            root.display()
        )
    })
}
