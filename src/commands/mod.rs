
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use crate::KbError;
use crate::answer::{AnswerGenerator, CompletionEndpoint, HttpCompletionClient};
use crate::config::{Config, OllamaConfig, RetrievalConfig};
use crate::embeddings::{Embedder, EmbeddingModel, OllamaClient};
use crate::indexer::{IngestionReport, Indexer};
use crate::parser::FileParser;
use crate::retrieval::Retriever;
use crate::store::{ConsistencyReport, KnowledgeBase, consistency_report};

const QUESTION_PROMPT: &str = "Enter your question (or 'quit'): ";

/// Ingest every new file under the knowledge directory
#[inline]
pub fn ingest(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let embedder = Embedder::new(client);

    let indexer = Indexer::from_config(config, FileParser, &embedder)?;
    info!("Scanning {}", indexer.root().display());

    let report = indexer.run()?;
    print_ingestion_report(&report);
    Ok(())
}

fn print_ingestion_report(report: &IngestionReport) {
    if report.no_op {
        println!(
            "No new files to ingest ({} files already indexed).",
            report.files_discovered
        );
        return;
    }

    println!("Ingestion complete!");
    println!("  Files discovered: {}", report.files_discovered);
    println!("  New files: {}", report.new_files);
    println!("  Parsed files: {}", report.parsed_files);
    println!("  Chunks created: {}", report.chunks_created);
    if let Some(index_size) = report.index_size {
        println!("  Vectors in index: {}", index_size);
    }

    if !report.failures.is_empty() {
        println!("  Failed files ({}, will be retried):", report.failures.len());
        for failure in &report.failures {
            println!("    {}: {}", failure.path.display(), failure.error);
        }
    }
}

/// Start the interactive question loop on stdin and stdout
#[inline]
pub fn query(config: &Config) -> Result<()> {
    let knowledge_base = KnowledgeBase::open(&config.store_paths())?;
    match &knowledge_base {
        Some(kb) => println!("Loaded index with {} vectors", kb.len()),
        None => {
            warn!("No knowledge base found");
            println!("No knowledge base found yet. Run 'kb-rag ingest' to build one.");
        }
    }

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let embedder = Embedder::new(client);
    let retriever = Retriever::new(knowledge_base.as_ref(), &embedder);
    let generator = AnswerGenerator::new(
        HttpCompletionClient::from_config(&config.completion),
        config.completion.clone(),
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    run_query_loop(
        stdin.lock(),
        stdout.lock(),
        &retriever,
        &generator,
        &config.retrieval,
    )
}

/// Read questions until `quit`, `exit` or end of input.
///
/// A failure while answering one question is reported and the loop carries on.
#[inline]
pub fn run_query_loop<R, W, M, C>(
    mut input: R,
    mut output: W,
    retriever: &Retriever<'_, M>,
    generator: &AnswerGenerator<C>,
    settings: &RetrievalConfig,
) -> Result<()>
where
    R: BufRead,
    W: Write,
    M: EmbeddingModel,
    C: CompletionEndpoint,
{
    let mut line = String::new();

    loop {
        write!(output, "\n{}", QUESTION_PROMPT)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output, "\nGoodbye!")?;
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("quit") || question.eq_ignore_ascii_case("exit") {
            writeln!(output, "Goodbye!")?;
            break;
        }

        answer_question(&mut output, question, retriever, generator, settings)?;
    }

    Ok(())
}

fn answer_question<W, M, C>(
    output: &mut W,
    question: &str,
    retriever: &Retriever<'_, M>,
    generator: &AnswerGenerator<C>,
    settings: &RetrievalConfig,
) -> Result<()>
where
    W: Write,
    M: EmbeddingModel,
    C: CompletionEndpoint,
{
    let results = match retriever.retrieve(question, settings.top_k, settings.min_score) {
        Ok(results) => results,
        Err(e) => {
            warn!("Retrieval failed: {}", e);
            writeln!(output, "Error retrieving context: {}", e)?;
            return Ok(());
        }
    };

    if results.is_empty() {
        writeln!(output, "No relevant documents found.")?;
        return Ok(());
    }

    for result in &results {
        writeln!(
            output,
            "score={:.4}  source={} chunk='{}...'",
            result.score, result.source, result.text
        )?;
    }

    match generator.answer(question, &results) {
        Ok(answer) => {
            writeln!(output, "\n--- Answer ---")?;
            writeln!(output, "{}", answer)?;
            writeln!(output, "--------------")?;
        }
        Err(e) => {
            warn!("Answer generation failed: {}", e);
            writeln!(output, "Error calling LLM server: {}", e)?;
            if let KbError::Upstream {
                body: Some(body), ..
            } = &e
            {
                writeln!(output, "{}", body)?;
            }
        }
    }

    Ok(())
}

/// Print file locations, counts and the consistency verdict
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    let paths = config.store_paths();
    let report = consistency_report(&paths);

    println!("Knowledge Base Status");
    println!("=====================");
    println!("Knowledge directory: {}", config.knowledge_dir().display());
    println!("Index file:          {}", paths.index.display());
    println!("Metadata file:       {}", paths.metadata.display());
    println!("Seen-files ledger:   {}", paths.seen.display());
    println!();

    print_status_report(&report);
    println!();
    println!("{}", ollama_status(&config.ollama));
    Ok(())
}

fn ollama_status(ollama: &OllamaConfig) -> String {
    match OllamaClient::quick_health_check(ollama) {
        Ok(()) => format!(
            "Ollama:      ✅ Connected ({}:{}, model {})",
            ollama.host, ollama.port, ollama.model
        ),
        Err(e) => {
            warn!("Ollama health check failed: {:#}", e);
            format!("Ollama:      ⚠️  Unavailable - {:#}", e)
        }
    }
}

fn print_status_report(report: &ConsistencyReport) {
    if report.is_fresh() {
        println!("No knowledge base has been built yet. Run 'kb-rag ingest'.");
    }

    println!("Vectors:     {}", count_or_dash(report.vectors));
    println!("Records:     {}", count_or_dash(report.records));
    println!("Dimension:   {}", count_or_dash(report.dimension));
    println!("Seen files:  {}", count_or_dash(report.seen_files));
    println!();

    if report.is_consistent {
        println!("✅ Consistent");
    } else {
        println!("⚠️  Inconsistent ({} problems):", report.problems.len());
        for problem in &report.problems {
            println!("   - {}", problem);
        }
    }
}

fn count_or_dash(count: Option<usize>) -> String {
    count.map_or_else(|| "-".to_string(), |c| c.to_string())
}
