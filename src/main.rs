use anyhow::Context;
use clap::Parser;
use food_table_ai::artifacts::ArtifactDirs;
use food_table_ai::cli::{Cli, Commands};
use food_table_ai::config::Config;
use food_table_ai::extractor::OpenAiVisionClient;
use food_table_ai::fetcher::{RetryPolicy, RetryingFetcher};
use food_table_ai::merger::{sort_json_files_in_directory, CategoryMerger};
use food_table_ai::pipeline::{Pipeline, PipelineOptions};
use food_table_ai::{logging, scanner};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env はあれば読む
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_file.as_deref())?;
    let mut config = Config::load().context("設定の読み込みに失敗")?;

    match cli.command {
        Commands::Run(args) => {
            println!("🍱 food-table-ai - 一括処理\n");
            args.apply_to(&mut config);
            config.validate()?;

            let dirs = ArtifactDirs::new(&config.temp_dir, &config.output_dir);
            let client = OpenAiVisionClient::new(&config)?;
            let fetcher = RetryingFetcher::new(
                Arc::new(client),
                RetryPolicy::from_config(&config),
                config.request_timeout(),
                dirs.clone(),
            );
            let mut options = PipelineOptions::from_config(&config);
            options.prune_merged = args.prune_merged;

            println!("[1/3] 画像ペアをスキャン中...");
            let scan = scanner::scan_pairs(&config.input_dir)
                .with_context(|| format!("スキャンに失敗: {}", config.input_dir.display()))?;
            println!("  {}ペアを検出", scan.pairs.len());

            println!("[2/3] AI抽出中...（同時実行 {}）", options.max_workers);
            let pipeline = Pipeline::new(fetcher, dirs, options);
            let extraction = pipeline
                .extract_pairs(scan)
                .await
                .with_context(|| format!("処理に失敗: {}", config.input_dir.display()))?;

            println!("[3/3] カテゴリをマージ中...");
            let summary = pipeline
                .merge_categories(extraction)
                .await
                .context("カテゴリマージに失敗")?;
            for path in summary.merge.written() {
                println!("  ✔ {}", path.display());
            }

            println!("\n📊 処理結果");
            println!("  総時間: {:.1}秒", summary.elapsed.as_secs_f64());
            println!("  ペア数: {}", summary.pair_count);
            println!("  成功: {}", summary.aggregate.succeeded.len());
            println!("  失敗: {}", summary.aggregate.failed.len());
            println!("  成功率: {:.1}%", summary.success_rate());
            println!("  平均: {:.1}秒/ペア", summary.average_per_pair().as_secs_f64());
            if !summary.unmatched.is_empty() {
                println!("  ペア不成立: {}枚", summary.unmatched.len());
            }
            if let Some(list) = &summary.aggregate.failed_list {
                println!("  失敗一覧: {}", list.display());
            }

            println!("\n✅ 完了");
        }

        Commands::Scan { folder } => {
            let folder = folder.unwrap_or_else(|| config.input_dir.clone());
            println!("🔍 food-table-ai - スキャン\n");

            let scan = scanner::scan_pairs(&folder)?;
            for pair in &scan.pairs {
                println!("  {} [{}]", pair.base_name, pair.category);
                println!("    energy:   {}", pair.energy.path.display());
                println!("    nutrient: {}", pair.nutrient.path.display());
            }
            println!("\n✔ {}ペアを検出", scan.pairs.len());
            if !scan.unmatched.is_empty() {
                println!("ペア不成立（処理対象外）:");
                for path in &scan.unmatched {
                    println!("  - {}", path.display());
                }
            }
        }

        Commands::Merge {
            temp_dir,
            output,
            prune_merged,
        } => {
            let temp = temp_dir.unwrap_or_else(|| config.temp_dir.clone());
            let output = output.unwrap_or_else(|| config.output_dir.clone());
            println!("🔗 food-table-ai - カテゴリマージ\n");

            let dirs = ArtifactDirs::new(&temp, &output);
            let summary = CategoryMerger::from_dirs(&dirs)
                .prune_merged(prune_merged)
                .run()
                .await
                .with_context(|| format!("マージに失敗: {}", dirs.categories.display()))?;

            for group in &summary.groups {
                println!(
                    "  ✔ {} ({}ファイル, {}件) → {}",
                    group.base_category,
                    group.sources.len(),
                    group.records,
                    group.output.display()
                );
            }
            for base in &summary.failed {
                println!("  ✗ {}", base);
            }
            println!("\n✅ マージ完了");
        }

        Commands::Sort { dir } => {
            println!("↕ food-table-ai - 並べ替え\n");
            let sorted = sort_json_files_in_directory(&dir)
                .await
                .with_context(|| format!("並べ替えに失敗: {}", dir.display()))?;
            println!("✔ {}ファイルを並べ替え", sorted);
        }

        Commands::Config { set_api_key, show } => {
            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  入力: {}", config.input_dir.display());
                println!("  出力: {}", config.output_dir.display());
                println!("  一時: {}", config.temp_dir.display());
                println!("  API: {}", config.api_base);
                println!("  モデル: {}", config.model);
                println!("  最大トークン: {}", config.max_tokens);
                println!("  温度: {}", config.temperature);
                println!("  同時実行: {}", config.max_workers);
                println!("  最大リトライ: {}", config.max_retries);
                println!("  リクエスト上限: {}秒", config.request_timeout_secs);
                println!("  ペア上限: {}秒", config.pair_timeout_secs);
                println!("  バックオフ単位: {}ms (上限 {}秒)", config.backoff_unit_ms, config.max_backoff_secs);
                println!("  APIキー: {}", config.masked_api_key());
            }
        }
    }

    Ok(())
}
