use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "food-table-ai")]
#[command(about = "食品成分表スクリーンショットAI抽出・JSON生成ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// ログをファイルにも追記
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像ペアを抽出してカテゴリ別JSONを生成
    Run(RunArgs),

    /// 画像ペアの検出のみ（API呼び出しなし）
    Scan {
        /// 画像フォルダ（省略時は設定の input_dir）
        folder: Option<PathBuf>,
    },

    /// カテゴリファイルの二次マージのみ
    Merge {
        /// 一時フォルダ（省略時は設定の temp_dir）
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// 出力フォルダ（省略時は設定の output_dir）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// マージした番号付きファイルを削除
        #[arg(long)]
        prune_merged: bool,
    },

    /// フォルダ内のJSON配列を食品コード順に並べ替え（上書き）
    Sort {
        #[arg(required = true)]
        dir: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// 画像フォルダ
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// 最終JSONの出力フォルダ
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 中間ファイルのフォルダ
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// 同時に処理するペア数
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// 画像ごとの最大リトライ回数
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// モデル名
    #[arg(long)]
    pub model: Option<String>,

    /// APIキー（保存はしない）
    #[arg(long)]
    pub api_key: Option<String>,

    /// APIベースURL
    #[arg(long)]
    pub api_base: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// マージした番号付きカテゴリファイルを削除
    #[arg(long)]
    pub prune_merged: bool,
}

impl RunArgs {
    /// 指定された引数で設定を上書き
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(v) = &self.input {
            config.input_dir = v.clone();
        }
        if let Some(v) = &self.output {
            config.output_dir = v.clone();
        }
        if let Some(v) = &self.temp_dir {
            config.temp_dir = v.clone();
        }
        if let Some(v) = self.workers {
            config.max_workers = v;
        }
        if let Some(v) = self.retries {
            config.max_retries = v;
        }
        if let Some(v) = &self.model {
            config.model = v.clone();
        }
        if let Some(v) = &self.api_key {
            config.api_key = Some(v.clone());
        }
        if let Some(v) = &self.api_base {
            config.api_base = v.clone();
        }
        if let Some(v) = self.max_tokens {
            config.max_tokens = v;
        }
        if let Some(v) = self.temperature {
            config.temperature = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from([
            "food-table-ai",
            "-v",
            "run",
            "--input",
            "imgs",
            "--workers",
            "8",
            "--retries",
            "1",
            "--prune-merged",
        ]);
        assert!(cli.verbose);

        let Commands::Run(args) = cli.command else {
            panic!("run expected");
        };
        assert!(args.prune_merged);

        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.input_dir, PathBuf::from("imgs"));
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.output_dir, PathBuf::from("_self_json_data"));
    }

    #[test]
    fn test_sort_requires_dir() {
        assert!(Cli::try_parse_from(["food-table-ai", "sort"]).is_err());
    }
}
