// 该文件是 Jianwen （见闻） 项目的一部分。
// src/bin/oneshot.rs - 单张图像检测与问答
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use url::Url;

use jianwen::{
  FromUrl,
  answer::{GeminiAnswererBuilder, Orchestrator, OrchestratorConfig},
  context::ContextBuilder,
  model::{HttpDetectorBuilder, QaExchange},
  normalize::Normalizer,
  task::{AskTask, ContextOrder, DetectTask},
};
use tracing::{info, warn};

/// 对单张图像运行检测，并可针对检测结果连续提问
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测服务地址
  #[arg(long, value_name = "URL")]
  pub detector: Url,
  /// 输入图像 (image://<path>)
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径 (image://<path>[?record=true])
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 问答服务
  #[arg(long, default_value = "gemini://gemini-2.5-flash", value_name = "URL")]
  pub answerer: Url,
  /// 针对检测结果的问题，可重复指定，按顺序作为同一会话提问
  #[arg(long, short)]
  pub question: Vec<String>,
  /// 检测置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25")]
  pub confidence: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测服务: {}", args.detector);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input_image = jianwen::input::ImageFileInput::from_url(&args.input)?;
  let detector = HttpDetectorBuilder::from_url(&args.detector)?
    .confidence_threshold(args.confidence)
    .build()?;
  let output = jianwen::output::SaveImageFileOutput::from_url(&args.output)?;

  info!("开始检测...");
  let now = std::time::Instant::now();
  let task = DetectTask::new(detector, Normalizer::default());
  let result = task.run(input_image.bytes()).await?;
  info!("检测完成，总耗时: {:.2?}", now.elapsed());

  let dropped = result.dropped();
  if dropped.total() > 0 {
    warn!("丢弃了 {} 条无效检测记录: {:?}", dropped.total(), dropped);
  }
  for record in result.detections() {
    let bbox = record.bounding_box();
    info!(
      "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
      record.class_name(),
      record.confidence() * 100.0,
      bbox.x1,
      bbox.y1,
      bbox.width(),
      bbox.height()
    );
  }
  output.save(&result)?;

  if args.question.is_empty() {
    return Ok(());
  }

  let answerer = GeminiAnswererBuilder::from_url(&args.answerer)?.build()?;
  let ask = AskTask::new(
    ContextBuilder::default(),
    Orchestrator::new(answerer, OrchestratorConfig::default()),
  );

  let mut history: Vec<QaExchange> = Vec::new();
  for question in &args.question {
    let exchange = ask
      .run(question, result.detections(), ContextOrder::Input, &history)
      .await?;
    println!("Q: {}", exchange.question);
    println!("A: {}", exchange.answer);
    println!();
    history.push(exchange);
  }

  Ok(())
}
