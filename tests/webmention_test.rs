// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests of webmention verification and vouch trust
//! evaluation, run against fake remote capabilities.

mod harness;

use harness::{temp_vouch_file, FakeDiscovery, FakeFetcher, FakeIndex};
use indieweb_endpoint::config::WebmentionConfig;
use indieweb_endpoint::error::Error;
use indieweb_endpoint::mention::{MemorySink, MentionVerifier};
use indieweb_endpoint::remote::ScanningParser;
use indieweb_endpoint::vouch::{VouchEvaluator, VouchList};
use std::sync::Arc;

const SOURCE: &str = "https://a.example/post";
const TARGET: &str = "https://site.example/article1";

const SOURCE_BODY: &str = r#"<html><body>
<div class="h-card"><span class="p-name">Alice Author</span>
<a class="u-url" href="https://a.example/">home</a></div>
<p>Nice piece: <a href="https://site.example/article1">this article</a></p>
</body></html>"#;

struct Setup {
    sink: Arc<MemorySink>,
    verifier: MentionVerifier,
}

fn setup(require_vouch: bool, discovery: FakeDiscovery, fetcher: FakeFetcher) -> Setup {
    let sink = Arc::new(MemorySink::new());
    let config = WebmentionConfig {
        require_vouch,
        vouch_file: temp_vouch_file().to_string_lossy().into_owned(),
    };
    let evaluator = VouchEvaluator::new(VouchList::new(&config.vouch_file), Arc::new(discovery));
    let verifier = MentionVerifier::new(
        Arc::new(fetcher),
        Arc::new(ScanningParser),
        Arc::new(FakeIndex::with_targets(&[TARGET])),
        sink.clone(),
        evaluator,
        &config,
    );
    Setup { sink, verifier }
}

fn linking_fetcher() -> FakeFetcher {
    FakeFetcher::new().with_page(SOURCE, SOURCE_BODY, &[TARGET, "https://elsewhere.example/"])
}

#[tokio::test]
async fn test_backlinked_mention_accepted_without_vouch_policy() {
    let setup = setup(false, FakeDiscovery::advertising_nothing(), linking_fetcher());

    let record = setup.verifier.verify(SOURCE, TARGET, None).await.unwrap();

    assert_eq!(record.source, SOURCE);
    assert_eq!(record.target, TARGET);
    assert!(!record.vouched);
    assert_eq!(record.author_name, "Alice Author");
    assert_eq!(record.author_url, "https://a.example/");
    assert!(record.content.contains("Nice piece"));

    let accepted = setup.sink.all().await;
    assert_eq!(accepted.len(), 1, "record handed to content storage");
}

#[tokio::test]
async fn test_missing_backlink_rejected() {
    let fetcher = FakeFetcher::new().with_page(SOURCE, SOURCE_BODY, &["https://other.example/"]);
    let setup = setup(false, FakeDiscovery::advertising_nothing(), fetcher);

    let result = setup.verifier.verify(SOURCE, TARGET, None).await;
    assert!(matches!(result, Err(Error::NoBacklink)));
    assert!(setup.sink.all().await.is_empty());
}

#[tokio::test]
async fn test_self_referential_mention_rejected() {
    let fetcher = FakeFetcher::new().with_page(SOURCE, SOURCE_BODY, &[SOURCE]);
    let setup = setup(false, FakeDiscovery::advertising_nothing(), fetcher);

    let result = setup.verifier.verify(SOURCE, SOURCE, None).await;
    assert!(matches!(
        result,
        Err(Error::TargetNotFound(_)) | Err(Error::NoBacklink)
    ));
}

#[tokio::test]
async fn test_unknown_target_rejected() {
    let setup = setup(false, FakeDiscovery::advertising_nothing(), linking_fetcher());

    let result = setup
        .verifier
        .verify(SOURCE, "https://site.example/article999-missing", None)
        .await;
    assert!(matches!(result, Err(Error::TargetNotFound(_))));
}

#[tokio::test]
async fn test_vouch_required_when_policy_demands_and_none_supplied() {
    // Valid backlink: still rejected
    let setup = setup(true, FakeDiscovery::advertising_nothing(), linking_fetcher());
    let result = setup.verifier.verify(SOURCE, TARGET, None).await;
    assert!(matches!(result, Err(Error::VouchRequired)));

    // Invalid backlink: rejection is the same
    let fetcher = FakeFetcher::new().with_page(SOURCE, SOURCE_BODY, &[]);
    let setup = self::setup(true, FakeDiscovery::advertising_nothing(), fetcher);
    let result = setup.verifier.verify(SOURCE, TARGET, None).await;
    assert!(matches!(result, Err(Error::VouchRequired)));
}

#[tokio::test]
async fn test_listed_vouch_domain_accepts_mention() {
    let vouch_file = temp_vouch_file();
    let list = VouchList::new(&vouch_file);
    list.append("trusted.example").await.unwrap();

    let sink = Arc::new(MemorySink::new());
    let config = WebmentionConfig {
        require_vouch: true,
        vouch_file: vouch_file.to_string_lossy().into_owned(),
    };
    let evaluator = VouchEvaluator::new(
        VouchList::new(&vouch_file),
        Arc::new(FakeDiscovery::advertising_nothing()),
    );
    let verifier = MentionVerifier::new(
        Arc::new(linking_fetcher()),
        Arc::new(ScanningParser),
        Arc::new(FakeIndex::with_targets(&[TARGET])),
        sink.clone(),
        evaluator,
        &config,
    );

    let record = verifier
        .verify(SOURCE, TARGET, Some("trusted.example"))
        .await
        .unwrap();
    assert!(record.vouched);
    assert_eq!(record.vouch_domain.as_deref(), Some("trusted.example"));
}

#[tokio::test]
async fn test_untrusted_vouch_domain_rejects_mention() {
    let setup = setup(true, FakeDiscovery::advertising_nothing(), linking_fetcher());

    let result = setup
        .verifier
        .verify(SOURCE, TARGET, Some("nobody.example"))
        .await;
    assert!(matches!(result, Err(Error::VouchUntrusted(_))));
    assert!(setup.sink.all().await.is_empty());
}

#[tokio::test]
async fn test_vouch_domain_with_both_endpoints_promoted_and_accepted() {
    let setup = setup(true, FakeDiscovery::advertising_both(), linking_fetcher());

    let record = setup
        .verifier
        .verify(SOURCE, TARGET, Some("voucher.example"))
        .await
        .unwrap();
    assert!(record.vouched);
}

#[tokio::test]
async fn test_unparseable_source_page_degrades_to_empty_author() {
    let fetcher = FakeFetcher::new().with_page(
        SOURCE,
        "not html at all \u{0000}",
        &[TARGET],
    );
    let setup = setup(false, FakeDiscovery::advertising_nothing(), fetcher);

    let record = setup.verifier.verify(SOURCE, TARGET, None).await.unwrap();
    assert_eq!(record.author_name, "");
    assert_eq!(record.author_url, "");
    assert!(record.mf2.items.is_empty());
}
