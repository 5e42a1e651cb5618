use serde::Serialize;
use std::fmt::Write as FmtWrite;

use crate::models::{ContextBundle, CorpusStats, EmbeddingServiceInfo, OutputFormat, SearchResults};
use crate::services::StoredDocument;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_context(&self, bundle: &ContextBundle) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_index_stats(&self, stats: &IndexStats) -> String;
    fn format_documents(&self, documents: &[StoredDocument]) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding: EmbeddingServiceInfo,
    pub vector_store_driver: String,
    pub vector_store_location: String,
    pub vector_store_connected: bool,
    pub stats: Option<CorpusStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub documents_found: u64,
    pub documents_indexed: u64,
    pub documents_unchanged: u64,
    pub documents_failed: u64,
    pub chunks_created: u64,
    pub duration_ms: u64,
    /// (location, error) for each failed document.
    pub failures: Vec<(String, String)>,
}

fn preview(content: &str) -> String {
    let head: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        let _ = writeln!(output, "Search results for: \"{}\"", results.query);
        let _ = writeln!(
            output,
            "Found {} results in {}ms ({})\n",
            results.len(),
            results.duration_ms,
            results.metric
        );

        for (i, result) in results.results.iter().enumerate() {
            let _ = writeln!(output, "{}. [Score: {:.3}] {}", i + 1, result.score, result.document_title);
            let _ = writeln!(output, "   Location: {}", result.location());
            if !result.tags.is_empty() {
                let tags: Vec<String> = result.tags.iter().map(ToString::to_string).collect();
                let _ = writeln!(output, "   Tags: {}", tags.join(", "));
            }
            let _ = writeln!(output, "   ---");
            for line in preview(&result.content).lines() {
                let _ = writeln!(output, "   {}", line);
            }
            let _ = writeln!(output);
        }

        output
    }

    fn format_context(&self, bundle: &ContextBundle) -> String {
        if bundle.is_empty() {
            return format!(
                "No context above threshold {:.2} for: {}\n",
                bundle.threshold, bundle.query
            );
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}\n", bundle.context);
        let _ = writeln!(output, "Sources");
        let _ = writeln!(output, "-------");
        for source in &bundle.sources {
            let _ = writeln!(
                output,
                "  {} ({}) [best {:.3}]",
                source.title, source.path, source.best_score
            );
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Status");
        let _ = writeln!(output, "------");

        let embedding = &status.embedding;
        let embed_status = if embedding.is_healthy() {
            "[OK]"
        } else if embedding.reachable {
            "[MISCONFIGURED]"
        } else {
            "[UNAVAILABLE]"
        };
        let _ = writeln!(output, "Embedding:     {}", embed_status);
        let _ = writeln!(output, "  Endpoint:    {}", embedding.endpoint);
        let _ = writeln!(output, "  Model:       {}", embedding.model);
        match embedding.dimension {
            Some(dim) => {
                let _ = writeln!(
                    output,
                    "  Dimension:   {} (expected {})",
                    dim, embedding.expected_dimension
                );
            }
            None => {
                let _ = writeln!(output, "  Dimension:   expected {}", embedding.expected_dimension);
            }
        }
        if embedding.reachable {
            let _ = writeln!(output, "  Latency:     {}ms", embedding.latency_ms);
        }
        if let Some(ref error) = embedding.error {
            let _ = writeln!(output, "  Error:       {}", error);
        }
        let _ = writeln!(output);

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        let _ = writeln!(
            output,
            "Vector Store:  {} ({})",
            status.vector_store_driver, vector_status
        );
        let _ = writeln!(output, "  Location:    {}", status.vector_store_location);
        if let Some(ref stats) = status.stats {
            let _ = writeln!(output, "  Documents:   {}", stats.total_documents);
            let _ = writeln!(output, "  Chunks:      {}", stats.total_chunks);
            let _ = writeln!(output, "  Avg chunk:   {:.0} chars", stats.average_chunk_size);
            let _ = writeln!(output, "  Embedded:    {}", stats.documents_with_embeddings);
            let _ = writeln!(output, "  Size:        {} bytes", stats.total_size_bytes);
        }

        output
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Indexing Complete");
        let _ = writeln!(output, "-----------------");
        let _ = writeln!(output, "Documents found:     {}", stats.documents_found);
        let _ = writeln!(output, "Documents indexed:   {}", stats.documents_indexed);
        let _ = writeln!(output, "Documents unchanged: {}", stats.documents_unchanged);
        let _ = writeln!(output, "Documents failed:    {}", stats.documents_failed);
        let _ = writeln!(output, "Chunks created:      {}", stats.chunks_created);
        let _ = writeln!(output, "Duration:            {}ms", stats.duration_ms);
        for (location, error) in &stats.failures {
            let _ = writeln!(output, "  ✗ {}: {}", location, error);
        }
        output
    }

    fn format_documents(&self, documents: &[StoredDocument]) -> String {
        if documents.is_empty() {
            return "No documents indexed.\n".to_string();
        }

        let mut output = String::new();
        let _ = writeln!(output, "Documents ({})", documents.len());
        let _ = writeln!(output, "---------");
        for stored in documents {
            let doc = &stored.document;
            let _ = writeln!(
                output,
                "  {}  {} [{}] {} chunks",
                doc.id, doc.title, doc.file_type, stored.chunk_count
            );
            let _ = writeln!(output, "      {}", doc.path);
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut json = rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
        json.push('\n');
        json
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_context(&self, bundle: &ContextBundle) -> String {
        self.render(bundle)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let failures: Vec<serde_json::Value> = stats
            .failures
            .iter()
            .map(|(location, error)| serde_json::json!({"location": location, "error": error}))
            .collect();

        self.render(&serde_json::json!({
            "documents_found": stats.documents_found,
            "documents_indexed": stats.documents_indexed,
            "documents_unchanged": stats.documents_unchanged,
            "documents_failed": stats.documents_failed,
            "chunks_created": stats.chunks_created,
            "duration_ms": stats.duration_ms,
            "failures": failures,
        }))
    }

    fn format_documents(&self, documents: &[StoredDocument]) -> String {
        self.render(&serde_json::json!({ "documents": documents }))
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        let _ = writeln!(output, "## Search Results\n");
        let _ = writeln!(output, "**Query:** `{}`\n", results.query);
        let _ = writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        );

        for (i, result) in results.results.iter().enumerate() {
            let _ = writeln!(
                output,
                "### {}. {} (score {:.3})\n",
                i + 1,
                result.document_title,
                result.score
            );
            let _ = writeln!(output, "**Location:** `{}`\n", result.location());
            if !result.tags.is_empty() {
                let tags: Vec<String> = result.tags.iter().map(|t| format!("`{}`", t)).collect();
                let _ = writeln!(output, "**Tags:** {}\n", tags.join(", "));
            }
            let _ = writeln!(output, "```");
            let _ = writeln!(output, "{}", result.content);
            let _ = writeln!(output, "```\n");
        }

        output
    }

    fn format_context(&self, bundle: &ContextBundle) -> String {
        if bundle.is_empty() {
            return format!("## No context found\n\nQuery: `{}`\n", bundle.query);
        }

        let mut output = String::new();
        let _ = writeln!(output, "## Context\n");
        let _ = writeln!(output, "**Query:** `{}`\n", bundle.query);
        let _ = writeln!(output, "```");
        let _ = writeln!(output, "{}", bundle.context);
        let _ = writeln!(output, "```\n");
        let _ = writeln!(output, "### Sources\n");
        let _ = writeln!(output, "| # | Document | Chunk | Score |");
        let _ = writeln!(output, "|---|----------|-------|-------|");
        for (i, citation) in bundle.citations.iter().enumerate() {
            let _ = writeln!(
                output,
                "| {} | {} (`{}`) | {} | {:.3} |",
                i + 1,
                citation.document_title,
                citation.document_path,
                citation.chunk_index,
                citation.score
            );
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "## Status\n");

        let embedding = &status.embedding;
        let embed_status = if embedding.is_healthy() { "✅" } else { "❌" };
        let _ = writeln!(output, "### Embedding {}\n", embed_status);
        let _ = writeln!(output, "- **Endpoint:** `{}`", embedding.endpoint);
        let _ = writeln!(output, "- **Model:** {}", embedding.model);
        let _ = writeln!(
            output,
            "- **Dimension:** {} (expected {})",
            embedding
                .dimension
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
            embedding.expected_dimension
        );
        if let Some(ref error) = embedding.error {
            let _ = writeln!(output, "- **Error:** {}", error);
        }
        let _ = writeln!(output);

        let vector_status = if status.vector_store_connected {
            "✅"
        } else {
            "❌"
        };
        let _ = writeln!(
            output,
            "### Vector Store ({}) {}\n",
            status.vector_store_driver, vector_status
        );
        let _ = writeln!(output, "- **Location:** `{}`", status.vector_store_location);
        if let Some(ref stats) = status.stats {
            let _ = writeln!(output, "- **Documents:** {}", stats.total_documents);
            let _ = writeln!(output, "- **Chunks:** {}", stats.total_chunks);
            let _ = writeln!(output, "- **Avg chunk:** {:.0} chars", stats.average_chunk_size);
        }

        output
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "## Indexing Complete\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Documents found | {} |", stats.documents_found);
        let _ = writeln!(output, "| Documents indexed | {} |", stats.documents_indexed);
        let _ = writeln!(output, "| Documents unchanged | {} |", stats.documents_unchanged);
        let _ = writeln!(output, "| Documents failed | {} |", stats.documents_failed);
        let _ = writeln!(output, "| Chunks created | {} |", stats.chunks_created);
        let _ = writeln!(output, "| Duration | {}ms |", stats.duration_ms);
        if !stats.failures.is_empty() {
            let _ = writeln!(output, "\n### Failures\n");
            for (location, error) in &stats.failures {
                let _ = writeln!(output, "- `{}`: {}", location, error);
            }
        }
        output
    }

    fn format_documents(&self, documents: &[StoredDocument]) -> String {
        if documents.is_empty() {
            return "## Documents\n\n*No documents indexed.*\n".to_string();
        }

        let mut output = String::new();
        let _ = writeln!(output, "## Documents\n");
        let _ = writeln!(output, "| Id | Title | Type | Chunks | Path |");
        let _ = writeln!(output, "|----|-------|------|--------|------|");
        for stored in documents {
            let doc = &stored.document;
            let _ = writeln!(
                output,
                "| `{}` | {} | {} | {} | `{}` |",
                doc.id, doc.title, doc.file_type, stored.chunk_count, doc.path
            );
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Citation, FileType, SearchResult, SimilarityMetric, SourceDocument};

    fn results() -> SearchResults {
        SearchResults {
            query: "fitzer".to_string(),
            metric: SimilarityMetric::Cosine,
            limit: 10,
            threshold: 0.1,
            results: vec![SearchResult {
                document_id: "doc1".to_string(),
                chunk_id: "chunk1".to_string(),
                document_path: "/docs/fitzer.md".to_string(),
                document_title: "Fitzer Manual".to_string(),
                file_type: FileType::Markdown,
                content: "Fitzer pump overview".to_string(),
                score: 0.91,
                chunk_index: 0,
                line_start: 1,
                line_end: 3,
                tags: Vec::new(),
            }],
            duration_ms: 4,
        }
    }

    #[test]
    fn test_text_search_results() {
        let out = TextFormatter.format_search_results(&results());
        assert!(out.contains("1. [Score: 0.910] Fitzer Manual"));
        assert!(out.contains("Location: /docs/fitzer.md:1-3"));
    }

    #[test]
    fn test_empty_results_message() {
        let mut empty = results();
        empty.results.clear();
        assert_eq!(
            TextFormatter.format_search_results(&empty),
            "No results found for: fitzer\n"
        );
    }

    #[test]
    fn test_json_search_results_parse_back() {
        let out = JsonFormatter::new(false).format_search_results(&results());
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["results"][0]["document_title"], "Fitzer Manual");
        assert_eq!(value["metric"], "cosine");
    }

    #[test]
    fn test_markdown_context_table() {
        let bundle = ContextBundle {
            query: "fitzer".to_string(),
            context: "[1] Fitzer Manual (/docs/fitzer.md:1-3)\nFitzer pump overview".to_string(),
            citations: vec![Citation {
                document_id: "doc1".to_string(),
                document_title: "Fitzer Manual".to_string(),
                document_path: "/docs/fitzer.md".to_string(),
                chunk_index: 0,
                score: 0.91,
            }],
            sources: vec![SourceDocument {
                document_id: "doc1".to_string(),
                title: "Fitzer Manual".to_string(),
                path: "/docs/fitzer.md".to_string(),
                best_score: 0.91,
            }],
            match_count: 1,
            threshold: 0.7,
        };
        let out = MarkdownFormatter.format_context(&bundle);
        assert!(out.contains("| 1 | Fitzer Manual (`/docs/fitzer.md`) | 0 | 0.910 |"));
    }
}
