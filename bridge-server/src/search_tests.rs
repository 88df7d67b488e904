//! Tests for exhaustive search pagination

#[cfg(test)]
mod tests {
    use crate::dispatcher::{CommandDispatcher, CommandWhitelist};
    use crate::provider::{ContextProvider, ProviderError};
    use crate::registry::ContextRegistry;
    use crate::search::{SearchConfig, paginate, search_functions};
    use assert_matches::assert_matches;
    use hostbridge_protocol::{BridgeError, SearchParams, SearchRequest, SearchResultRecord};
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    const RESET_LINES: [&str; 3] = [
        "ResetHandler @ 0x1000",
        "ResetVector @ 0x2000",
        "malformed-line",
    ];

    /// Provider answering searches from a fixed line set, recording the args
    struct SearchProvider {
        lines: Vec<String>,
        seen_args: Mutex<Vec<Value>>,
    }

    impl SearchProvider {
        fn new(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                seen_args: Mutex::new(Vec::new()),
            })
        }
    }

    impl ContextProvider for SearchProvider {
        fn name(&self) -> &str {
            "CodeBrowser"
        }

        fn has_program_context(&self) -> bool {
            true
        }

        fn has_program_manager_service(&self) -> bool {
            true
        }

        fn invoke(&self, operation: &str, args: &Value) -> Result<Value, ProviderError> {
            assert_eq!(operation, "search_functions");
            self.seen_args.lock().unwrap().push(args.clone());
            Ok(json!(self.lines))
        }
    }

    fn dispatcher_with(provider: Option<Arc<SearchProvider>>) -> CommandDispatcher {
        let registry = Arc::new(ContextRegistry::new());
        if let Some(provider) = provider {
            registry.register(provider);
        }
        CommandDispatcher::new(registry, CommandWhitelist::default())
    }

    fn request(query: &str, limit: Option<i64>, offset: Option<i64>) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            limit,
            offset,
        }
    }

    fn params(limit: usize, offset: usize) -> SearchParams {
        SearchParams {
            query: "Reset".to_string(),
            limit,
            offset,
        }
    }

    #[tokio::test]
    async fn test_reset_example_first_page() {
        let provider = SearchProvider::new(&RESET_LINES);
        let dispatcher = dispatcher_with(Some(provider.clone()));

        let response = search_functions(
            &dispatcher,
            &SearchConfig::default(),
            request("Reset", Some(5), Some(0)),
        )
        .await
        .unwrap();

        assert_eq!(response.query, "Reset");
        assert_eq!(response.total_results, 2);
        assert_eq!(response.page, 1);
        assert_eq!(response.limit, 5);
        assert_eq!(
            response.items,
            vec![
                SearchResultRecord::new("ResetHandler", "0x1000"),
                SearchResultRecord::new("ResetVector", "0x2000"),
            ]
        );
        assert_eq!(response.dropped_lines, 1);
    }

    #[tokio::test]
    async fn test_reset_example_second_page() {
        let dispatcher = dispatcher_with(Some(SearchProvider::new(&RESET_LINES)));

        let response = search_functions(
            &dispatcher,
            &SearchConfig::default(),
            request("Reset", Some(1), Some(1)),
        )
        .await
        .unwrap();

        assert_eq!(response.page, 2);
        assert_eq!(response.total_results, 2);
        assert_eq!(
            response.items,
            vec![SearchResultRecord::new("ResetVector", "0x2000")]
        );
    }

    #[tokio::test]
    async fn test_only_query_is_forwarded() {
        let provider = SearchProvider::new(&RESET_LINES);
        let dispatcher = dispatcher_with(Some(provider.clone()));

        search_functions(
            &dispatcher,
            &SearchConfig::default(),
            request("Reset", Some(1), Some(1)),
        )
        .await
        .unwrap();

        let seen = provider.seen_args.lock().unwrap();
        assert_eq!(seen.as_slice(), &[json!({"query": "Reset"})]);
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty_not_error() {
        let dispatcher = dispatcher_with(Some(SearchProvider::new(&RESET_LINES)));

        let response = search_functions(
            &dispatcher,
            &SearchConfig::default(),
            request("Reset", Some(10), Some(50)),
        )
        .await
        .unwrap();

        assert!(response.items.is_empty());
        assert_eq!(response.total_results, 2);
        assert_eq!(response.page, 6);
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let dispatcher = dispatcher_with(Some(SearchProvider::new(&RESET_LINES)));

        let response = search_functions(
            &dispatcher,
            &SearchConfig::default(),
            request("Reset", None, None),
        )
        .await
        .unwrap();

        assert_eq!(response.limit, 100);
        assert_eq!(response.page, 1);
    }

    #[tokio::test]
    async fn test_validation_happens_before_downstream() {
        let provider = SearchProvider::new(&RESET_LINES);
        let dispatcher = dispatcher_with(Some(provider.clone()));
        let config = SearchConfig::default();

        let err = search_functions(&dispatcher, &config, request("", None, None))
            .await
            .unwrap_err();
        assert_matches!(err, BridgeError::Validation { ref field, .. } if field == "query");

        let err = search_functions(&dispatcher, &config, request("Reset", Some(1001), None))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("limit"));

        let err = search_functions(&dispatcher, &config, request("Reset", None, Some(-1)))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("offset"));

        assert!(provider.seen_args.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_active_context() {
        let dispatcher = dispatcher_with(None);

        let err = search_functions(
            &dispatcher,
            &SearchConfig::default(),
            request("Reset", None, None),
        )
        .await
        .unwrap_err();

        assert_matches!(err, BridgeError::NoActiveContext { .. });
    }

    #[test]
    fn test_paginate_normalizes_addresses() {
        let response = paginate(&params(10, 0), &["Init @ 0XDEADBEEF", "  Main @ 0x00AB  "]);
        assert_eq!(response.items[0].address, "0xdeadbeef");
        assert_eq!(response.items[1].name, "Main");
        assert_eq!(response.items[1].address, "0x00ab");
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            ("[A-Za-z_][A-Za-z0-9_]{0,12}", 0u64..0xffff_ffff)
                .prop_map(|(name, addr)| format!("{name} @ 0x{addr:x}")),
            "[a-z-]{1,16}",
        ]
    }

    proptest! {
        #[test]
        fn prop_total_independent_of_page(
            lines in proptest::collection::vec(line_strategy(), 0..50),
            limit in 1usize..=1000,
            offset in 0usize..80,
        ) {
            let full = paginate(&params(1000, 0), &lines);
            let page = paginate(&params(limit, offset), &lines);

            prop_assert_eq!(page.total_results, full.total_results);
            prop_assert_eq!(page.dropped_lines, full.dropped_lines);
            prop_assert_eq!(page.total_results + page.dropped_lines, lines.len());
            prop_assert_eq!(page.page, offset / limit + 1);

            let expected: Vec<_> = full.items.iter().skip(offset).take(limit).cloned().collect();
            prop_assert_eq!(page.items, expected);
        }
    }
}
