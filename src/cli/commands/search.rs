use anyhow::{Context, Result};
use clap::Args;

use super::{open_embedder, open_store, parse_metadata_pair};
use crate::cli::output::get_formatter;
use crate::models::{
    Config, FileType, MetadataCondition, OutputFormat, SearchFilter, SearchRequest,
    SimilarityMetric, Tag, parse_tags,
};
use crate::services::RetrievalService;

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Maximum number of results to return")]
    pub limit: Option<usize>,

    #[arg(
        long,
        help = "Similarity threshold (minimum for cosine, maximum distance for l2)"
    )]
    pub threshold: Option<f32>,

    #[arg(long, short = 'm', help = "Similarity metric: cosine or l2")]
    pub metric: Option<SimilarityMetric>,

    #[arg(
        long,
        short = 't',
        help = "Filter by tags (e.g., 'team:billing,lang:en')"
    )]
    pub tags: Option<String>,

    #[arg(
        long = "type",
        value_name = "TYPES",
        help = "Filter by file type (e.g., 'markdown,html')"
    )]
    pub file_types: Option<String>,

    #[arg(long, short = 'k', help = "Only chunks mentioning any of these keywords (repeatable)")]
    pub keyword: Vec<String>,

    #[arg(long, help = "Restrict to these document ids (repeatable)")]
    pub doc: Vec<String>,

    #[arg(long, value_name = "KEY=VALUE", help = "Metadata equality filter (repeatable)")]
    pub meta: Vec<String>,
}

impl SearchArgs {
    fn filter(&self) -> Result<SearchFilter> {
        let tags: Vec<Tag> = self
            .tags
            .as_ref()
            .map(|s| parse_tags(s))
            .transpose()
            .context("failed to parse tags")?
            .unwrap_or_default();

        let file_types: Vec<FileType> = match self.file_types {
            Some(ref types) => types
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<FileType>().map_err(|e| anyhow::anyhow!("{e}")))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let metadata = self
            .meta
            .iter()
            .map(|pair| parse_metadata_condition(pair))
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchFilter {
            document_ids: self.doc.clone(),
            file_types,
            tags,
            keywords: self.keyword.iter().map(|k| k.to_lowercase()).collect(),
            metadata,
        })
    }
}

fn parse_metadata_condition(pair: &str) -> Result<MetadataCondition> {
    let (key, value) = parse_metadata_pair(pair)?;
    Ok(MetadataCondition { key, value })
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    if args.limit == Some(0) {
        anyhow::bail!("limit must be at least 1");
    }

    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let filter = args.filter()?;

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!(
            "  Limit: {}",
            args.limit.unwrap_or(config.retrieval.search_limit)
        );
        eprintln!(
            "  Threshold: {}",
            args.threshold.unwrap_or(config.retrieval.search_threshold)
        );
        if !filter.is_empty() {
            eprintln!("  Filter: {}", serde_json::to_string(&filter)?);
        }
    }

    let embedder = open_embedder(&config)?;
    let store = open_store(&config).await?;
    let service = RetrievalService::new(embedder, store, config.retrieval.clone());

    let mut request = SearchRequest::new(query).with_filter(filter);
    request.limit = args.limit;
    request.threshold = args.threshold;
    request.metric = args.metric;

    let results = service.search_with(request).await.context("search failed")?;

    if verbose {
        eprintln!("  Found: {} result(s) in {}ms", results.len(), results.duration_ms);
    }

    print!("{}", formatter.format_search_results(&results));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataValue;

    fn args() -> SearchArgs {
        SearchArgs {
            query: "pump".to_string(),
            limit: None,
            threshold: None,
            metric: None,
            tags: None,
            file_types: None,
            keyword: Vec::new(),
            doc: Vec::new(),
            meta: Vec::new(),
        }
    }

    #[test]
    fn test_parse_metadata_condition() {
        let cond = parse_metadata_condition("year=2024").unwrap();
        assert_eq!(cond.key, "year");
        assert_eq!(cond.value, MetadataValue::Integer(2024));

        let cond = parse_metadata_condition("draft=false").unwrap();
        assert_eq!(cond.value, MetadataValue::Boolean(false));

        let cond = parse_metadata_condition("team = billing ").unwrap();
        assert_eq!(cond.key, "team");
        assert_eq!(cond.value, MetadataValue::String("billing".to_string()));

        assert!(parse_metadata_condition("novalue").is_err());
        assert!(parse_metadata_condition("=x").is_err());
    }

    #[test]
    fn test_build_filter() {
        let mut a = args();
        a.tags = Some("team:billing".to_string());
        a.file_types = Some("md, html".to_string());
        a.keyword = vec!["Fitzer".to_string()];
        a.meta = vec!["year=2024".to_string()];

        let filter = a.filter().unwrap();
        assert_eq!(filter.tags.len(), 1);
        assert_eq!(filter.file_types, vec![FileType::Markdown, FileType::Html]);
        assert_eq!(filter.keywords, vec!["fitzer".to_string()]);
        assert_eq!(filter.metadata.len(), 1);
    }

    #[test]
    fn test_empty_filter() {
        assert!(args().filter().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_file_type() {
        let mut a = args();
        a.file_types = Some("pdf".to_string());
        assert!(a.filter().is_err());
    }
}
