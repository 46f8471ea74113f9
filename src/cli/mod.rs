//! CLI 모듈
//!
//! palank-pdfqa CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::collector::{CollectionStats, DocumentCollector};
use crate::config::RagConfig;
use crate::embedding::{create_provider, has_api_key};
use crate::knowledge::{BlobStore, FsBlobStore, IndexSource};
use crate::rag::{ChatSession, QueryOutcome, RagSystem};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "palank-pdfqa")]
#[command(version, about = "로컬 PDF 지식베이스 질의응답", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: ./palank-pdfqa.toml 또는 <data_local_dir>/.palank-pdfqa/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 지식베이스에 질문
    Query {
        /// 질문
        question: String,

        /// 답변에 사용된 문맥 출력
        #[arg(short, long)]
        sources: bool,
    },

    /// 대화형 질의응답 (빈 줄 또는 `exit`로 종료, `/reset`으로 기록 초기화)
    Chat,

    /// 모든 문서의 임베딩 인덱스 미리 생성
    Index {
        /// 캐시를 무시하고 다시 생성 (손상된 캐시 복구)
        #[arg(long)]
        force: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Query { question, sources } => cmd_query(config, &question, sources).await,
        Commands::Chat => cmd_chat(config).await,
        Commands::Index { force } => cmd_index(config, force).await,
        Commands::Status => cmd_status(config).await,
    }
}

fn open_system(config: RagConfig) -> Result<RagSystem> {
    let provider = create_provider(&config).context("모델 프로바이더 생성 실패")?;
    RagSystem::new(config, provider).context("RAG 시스템 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질의 명령어 (query)
async fn cmd_query(config: RagConfig, question: &str, sources: bool) -> Result<()> {
    let system = open_system(config)?;

    println!("[*] 질의 중: \"{}\"", question);

    let outcome = system.query(question).await.context("질의 실패")?;
    print_outcome(&outcome, sources);

    Ok(())
}

/// 대화 명령어 (chat)
async fn cmd_chat(config: RagConfig) -> Result<()> {
    let system = open_system(config)?;
    let mut session = ChatSession::new();

    println!(
        "[*] 대화를 시작합니다 ({}). 빈 줄 또는 exit로 종료합니다.",
        system.provider_name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        match question {
            "" | "exit" | "quit" => break,
            "/reset" => {
                session.clear();
                println!("[OK] 대화 기록을 초기화했습니다.");
                continue;
            }
            _ => {}
        }

        // 대화 중 에러는 세션을 끝내지 않고 보고만 합니다
        match system.ask(&mut session, question).await {
            Ok(outcome) => print_outcome(&outcome, false),
            Err(e) => println!("[!] {}", e),
        }
    }

    println!("[OK] 대화 종료 ({} 턴)", session.history().len());
    Ok(())
}

/// 인덱싱 명령어 (index)
async fn cmd_index(config: RagConfig, force: bool) -> Result<()> {
    let system = open_system(config)?;

    let reports = system.index_all(force).await.context("인덱싱 실패")?;

    if reports.is_empty() {
        println!("[!] 지식베이스에 문서가 없습니다.");
        return Ok(());
    }

    println!("[*] 인덱싱 대상: {} 문서\n", reports.len());

    let mut success_count = 0;
    let mut error_count = 0;

    for (i, report) in reports.iter().enumerate() {
        let file_name = report
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        match &report.result {
            Ok(summary) => {
                let source_str = match &summary.source {
                    IndexSource::Cache => "캐시".to_string(),
                    IndexSource::Built => "생성".to_string(),
                    IndexSource::BuiltUnpersisted(reason) => format!("생성, 저장 실패: {}", reason),
                };
                println!(
                    "[{}/{}] {}... 완료 ({} 청크, {})",
                    i + 1,
                    reports.len(),
                    file_name,
                    summary.records,
                    source_str
                );
                if summary.skipped_batches > 0 {
                    println!("      [!] 건너뛴 배치: {}", summary.skipped_batches);
                }
                success_count += 1;
            }
            Err(message) => {
                println!(
                    "[{}/{}] {}... 실패: {}",
                    i + 1,
                    reports.len(),
                    file_name,
                    message
                );
                error_count += 1;
            }
        }
    }

    println!();
    println!("[OK] 완료: 성공 {}, 실패 {}", success_count, error_count);

    match system.cache().entry_count().await {
        Ok(count) => println!("     캐시 엔트리: {} 건", count),
        Err(e) => tracing::debug!("캐시 엔트리 조회 실패: {}", e),
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 모델 서버 연결 없이 설정과 로컬 상태만 확인합니다.
async fn cmd_status(config: RagConfig) -> Result<()> {
    println!("palank-pdfqa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!(
        "[*] 프로바이더: {} (임베딩: {}, LLM: {})",
        config.provider, config.embedding_model_id, config.llm_model_id
    );
    println!(
        "[*] 청킹: {} / 오버랩 {}, top-k {}, 배치 {}",
        config.chunk_size, config.chunk_overlap, config.top_k, config.batch_size
    );
    println!("[*] 설정 지문: {}", config.fingerprint());

    if config.provider == "gemini" {
        if has_api_key() {
            println!("[OK] API 키: 설정됨");
        } else {
            println!("[!] API 키: 미설정");
            println!("    설정: export GEMINI_API_KEY=your-key");
        }
    }

    // 지식베이스
    println!(
        "[*] 지식베이스: {}",
        config.knowledge_base_path.display()
    );
    let collector = DocumentCollector::new(&config.extensions);
    match collector.collect(&config.knowledge_base_path) {
        Ok(files) => {
            let stats = CollectionStats::from_files(&files);
            println!(
                "[OK] 문서: {} 건 (PDF: {}, 텍스트: {})",
                stats.total_files, stats.pdf_files, stats.text_files
            );
            println!("     총 크기: {}", format_bytes(stats.total_size as usize));
        }
        Err(e) => println!("[!] {}", e),
    }

    // 임베딩 캐시
    println!("[*] 임베딩 캐시: {}", config.embeddings_path.display());
    match FsBlobStore::open(&config.embeddings_path) {
        Ok(store) => match store.keys().await {
            Ok(keys) => {
                let current = keys
                    .iter()
                    .filter(|k| k.ends_with(&config.fingerprint()))
                    .count();
                println!(
                    "[OK] 캐시 엔트리: {} 건 (현재 설정: {} 건)",
                    keys.len(),
                    current
                );
            }
            Err(e) => println!("[!] 캐시 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 캐시 디렉토리 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_outcome(outcome: &QueryOutcome, sources: bool) {
    for failure in outcome.failures() {
        println!("[!] 건너뛴 문서: {} ({})", failure.path.display(), failure.message);
    }

    match outcome {
        QueryOutcome::Answer(answer) => {
            println!("\n{}", answer.text.trim());

            if sources {
                println!("\n[*] 문맥 ({} 건):", answer.passages.len());
                for (i, passage) in answer.passages.iter().enumerate() {
                    println!(
                        "{}. [유사도: {:.4}] {}",
                        i + 1,
                        passage.similarity,
                        passage.source.display()
                    );
                    println!("   {}", truncate_text(&passage.text, 200));
                }
            }
        }
        _ => println!("\n[!] {}", outcome),
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::parse_from(["palank-pdfqa", "index", "--force"]);
        assert!(matches!(cli.command, Commands::Index { force: true }));
        assert!(cli.config.is_none());

        let cli = Cli::parse_from([
            "palank-pdfqa",
            "query",
            "What is RAG?",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Query { question, sources } => {
                assert_eq!(question, "What is RAG?");
                assert!(!sources);
            }
            _ => panic!("expected query command"),
        }
    }
}
