//! Page-view attribution and the admin traffic summary.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use db::models::activity_log::{ActivityLog, CreateActivityLog, DeviceType, TrafficSource};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;
use ts_rs::TS;
use url::Url;
use uuid::Uuid;

/// Views shorter than this on a single-page session count as a bounce.
const BOUNCE_THRESHOLD_SECS: i64 = 10;
/// Longest time on page a beacon can report; longer values are clamped.
const MAX_DURATION_SECS: i64 = 86_400;
const TOP_PAGES_LIMIT: usize = 10;

const PAID_MEDIUMS: &[&str] = &["cpc", "ppc", "paid", "paidsearch", "paid_search", "paid_social"];
const EMAIL_MARKERS: &[&str] = &["email", "e-mail", "newsletter"];
const SEARCH_ENGINES: &[&str] = &[
    "google",
    "bing",
    "yandex",
    "duckduckgo",
    "yahoo",
    "baidu",
    "ecosia",
];
const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "t.co",
    "linkedin.com",
    "lnkd.in",
    "youtube.com",
    "tiktok.com",
    "pinterest.com",
    "reddit.com",
    "whatsapp.com",
    "wa.me",
    "t.me",
];
const SOCIAL_SOURCES: &[&str] = &[
    "facebook", "fb", "instagram", "ig", "twitter", "x", "linkedin", "youtube", "tiktok",
    "pinterest", "reddit", "whatsapp", "telegram",
];

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(String),
}

/// Raw page view as reported by the browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct PageViewEvent {
    pub session_id: String,
    pub user_id: Option<Uuid>,
    /// Path or absolute URL of the viewed page, query string included.
    pub page_path: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub duration_seconds: Option<i64>,
    pub scroll_depth: Option<i64>,
    /// Host of the site itself; referrers from it are internal navigation.
    pub site_host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct PageCount {
    pub page_path: String,
    pub views: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct ActivitySummary {
    pub since: DateTime<Utc>,
    pub total_views: i64,
    pub unique_sessions: i64,
    pub landing_views: i64,
    /// Bounced landings over all landings, 0.0 when there are none.
    pub bounce_rate: f64,
    pub avg_duration_seconds: f64,
    pub avg_scroll_depth: f64,
    pub by_source: BTreeMap<String, i64>,
    pub by_device: BTreeMap<String, i64>,
    pub top_pages: Vec<PageCount>,
}

pub struct ActivityTracker;

impl ActivityTracker {
    /// Stores a page view. The first view of a session is its landing; any
    /// later view clears the session's provisional bounce flag.
    pub async fn record(
        pool: &SqlitePool,
        event: &PageViewEvent,
    ) -> Result<ActivityLog, ActivityError> {
        if event.session_id.trim().is_empty() {
            return Err(ActivityError::Validation("session_id is required".into()));
        }
        if event.page_path.trim().is_empty() {
            return Err(ActivityError::Validation("page_path is required".into()));
        }

        let session_id = event.session_id.trim();

        // Clearing first takes the write lock, so concurrent views of one
        // session cannot both see an empty session and record two landings.
        let mut tx = pool.begin().await?;
        ActivityLog::clear_session_bounce(&mut *tx, session_id).await?;
        let is_landing = !ActivityLog::session_has_events(&mut *tx, session_id).await?;
        let log = ActivityLog::create(&mut *tx, &derive(event, is_landing)).await?;
        tx.commit().await?;
        debug!(
            session_id = %log.session_id,
            page_path = %log.page_path,
            traffic_source = %log.traffic_source,
            is_landing,
            "Page view recorded"
        );
        Ok(log)
    }

    pub async fn summary(
        pool: &SqlitePool,
        since: DateTime<Utc>,
    ) -> Result<ActivitySummary, ActivityError> {
        let logs = ActivityLog::find_since(pool, since).await?;
        Ok(summarize(&logs, since))
    }
}

/// Derives the stored row from a raw event.
pub fn derive(event: &PageViewEvent, is_landing: bool) -> CreateActivityLog {
    let page_url = parse_page_url(&event.page_path);
    let query: HashMap<String, String> = page_url
        .as_ref()
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default();

    let utm = |explicit: &Option<String>, key: &str| {
        non_empty(explicit.as_deref())
            .or_else(|| non_empty(query.get(key).map(String::as_str)))
    };
    let utm_source = utm(&event.utm_source, "utm_source");
    let utm_medium = utm(&event.utm_medium, "utm_medium");
    let utm_campaign = utm(&event.utm_campaign, "utm_campaign");

    let own_host = event
        .site_host
        .as_deref()
        .map(|h| h.trim().to_lowercase())
        .or_else(|| {
            page_url
                .as_ref()
                .filter(|url| url.host_str() != Some(PLACEHOLDER_HOST))
                .and_then(|url| url.host_str().map(str::to_lowercase))
        });
    let referrer = non_empty(event.referrer.as_deref());
    let referrer_host = referrer
        .as_deref()
        .and_then(|r| Url::parse(r).ok())
        .and_then(|url| url.host_str().map(str::to_lowercase))
        .filter(|host| own_host.as_deref().is_none_or(|own| !same_site(host, own)));

    let traffic_source = classify_traffic(
        utm_source.as_deref(),
        utm_medium.as_deref(),
        referrer_host.as_deref(),
    );

    let page_path = page_url
        .as_ref()
        .map(|url| url.path().to_string())
        .unwrap_or_else(|| event.page_path.trim().to_string());
    let duration_seconds = event
        .duration_seconds
        .unwrap_or(0)
        .clamp(0, MAX_DURATION_SECS);

    CreateActivityLog {
        session_id: event.session_id.trim().to_string(),
        user_id: event.user_id,
        page_path,
        page_title: non_empty(event.page_title.as_deref()),
        referrer,
        utm_source,
        utm_medium,
        utm_campaign,
        traffic_source,
        device_type: classify_device(event.user_agent.as_deref().unwrap_or_default()),
        duration_seconds,
        scroll_depth: event.scroll_depth.unwrap_or(0).clamp(0, 100),
        is_landing,
        is_bounce: is_landing && duration_seconds < BOUNCE_THRESHOLD_SECS,
    }
}

pub fn classify_traffic(
    utm_source: Option<&str>,
    utm_medium: Option<&str>,
    referrer_host: Option<&str>,
) -> TrafficSource {
    let source = utm_source.map(str::to_lowercase);
    let medium = utm_medium.map(str::to_lowercase);
    let source = source.as_deref();
    let medium = medium.as_deref();

    if medium.is_some_and(|m| PAID_MEDIUMS.contains(&m)) {
        return TrafficSource::Paid;
    }
    if medium.is_some_and(|m| EMAIL_MARKERS.contains(&m))
        || source.is_some_and(|s| EMAIL_MARKERS.contains(&s))
    {
        return TrafficSource::Email;
    }
    if medium == Some("social")
        || source.is_some_and(|s| SOCIAL_SOURCES.contains(&s))
        || referrer_host.is_some_and(is_social_host)
    {
        return TrafficSource::Social;
    }
    if medium == Some("organic")
        || source.is_some_and(|s| SEARCH_ENGINES.contains(&s))
        || referrer_host.is_some_and(is_search_host)
    {
        return TrafficSource::OrganicSearch;
    }
    if referrer_host.is_some() || medium == Some("referral") {
        return TrafficSource::Referral;
    }
    TrafficSource::Direct
}

pub fn classify_device(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_lowercase();
    let is_android = ua.contains("android");
    if ua.contains("ipad")
        || ua.contains("tablet")
        || ua.contains("kindle")
        || ua.contains("silk/")
        || (is_android && !ua.contains("mobile"))
    {
        DeviceType::Tablet
    } else if ua.contains("mobi")
        || ua.contains("iphone")
        || ua.contains("ipod")
        || ua.contains("windows phone")
        || is_android
    {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

/// Reduces page views into the admin dashboard numbers.
pub fn summarize(logs: &[ActivityLog], since: DateTime<Utc>) -> ActivitySummary {
    let total_views = logs.len() as i64;
    let sessions: HashSet<&str> = logs.iter().map(|l| l.session_id.as_str()).collect();
    let landing_views = logs.iter().filter(|l| l.is_landing).count() as i64;
    let bounces = logs.iter().filter(|l| l.is_landing && l.is_bounce).count() as i64;

    let mut by_source = BTreeMap::new();
    let mut by_device = BTreeMap::new();
    let mut pages: HashMap<&str, i64> = HashMap::new();
    for log in logs {
        *by_source.entry(log.traffic_source.to_string()).or_insert(0) += 1;
        *by_device.entry(log.device_type.to_string()).or_insert(0) += 1;
        *pages.entry(log.page_path.as_str()).or_insert(0) += 1;
    }

    let mut top_pages: Vec<PageCount> = pages
        .into_iter()
        .map(|(page_path, views)| PageCount {
            page_path: page_path.to_string(),
            views,
        })
        .collect();
    top_pages.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.page_path.cmp(&b.page_path)));
    top_pages.truncate(TOP_PAGES_LIMIT);

    ActivitySummary {
        since,
        total_views,
        unique_sessions: sessions.len() as i64,
        landing_views,
        bounce_rate: ratio(bounces, landing_views),
        avg_duration_seconds: mean(logs.iter().map(|l| l.duration_seconds), total_views),
        avg_scroll_depth: mean(logs.iter().map(|l| l.scroll_depth), total_views),
        by_source,
        by_device,
        top_pages,
    }
}

const PLACEHOLDER_HOST: &str = "placeholder.invalid";

fn parse_page_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if url.has_host() => Some(url),
        _ => Url::parse(&format!("https://{PLACEHOLDER_HOST}"))
            .ok()?
            .join(raw)
            .ok(),
    }
}

fn same_site(host: &str, own: &str) -> bool {
    let strip = |h: &str| h.strip_prefix("www.").unwrap_or(h).to_string();
    strip(host) == strip(own)
}

fn is_social_host(host: &str) -> bool {
    SOCIAL_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

fn is_search_host(host: &str) -> bool {
    // Match on a label so regional domains like google.com.tr count.
    host.split('.').any(|label| SEARCH_ENGINES.contains(&label))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Averages in f64 so rows written before clamping cannot overflow the sum.
fn mean(values: impl Iterator<Item = i64>, count: i64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    values.map(|v| v as f64).sum::<f64>() / count as f64
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use db::DBService;

    use super::*;

    const IPHONE: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15";
    const ANDROID_TABLET: &str =
        "Mozilla/5.0 (Linux; Android 13; SM-X200) AppleWebKit/537.36 Chrome/116.0 Safari/537.36";
    const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
        Chrome/120.0 Mobile Safari/537.36";
    const DESKTOP: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    fn event(page_path: &str, referrer: Option<&str>) -> PageViewEvent {
        PageViewEvent {
            session_id: "s-1".to_string(),
            page_path: page_path.to_string(),
            referrer: referrer.map(str::to_string),
            user_agent: Some(DESKTOP.to_string()),
            site_host: Some("www.yolyardim.example".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_traffic_source_precedence() {
        let source = |path: &str, referrer: Option<&str>| {
            derive(&event(path, referrer), true).traffic_source
        };

        assert_eq!(source("/?utm_source=google&utm_medium=cpc", None), TrafficSource::Paid);
        assert_eq!(
            source("/?utm_medium=email", Some("https://www.google.com/")),
            TrafficSource::Email
        );
        assert_eq!(source("/?utm_source=newsletter", None), TrafficSource::Email);
        assert_eq!(source("/", Some("https://l.facebook.com/l.php?u=x")), TrafficSource::Social);
        assert_eq!(source("/?utm_source=instagram", None), TrafficSource::Social);
        assert_eq!(source("/", Some("https://www.google.com.tr/")), TrafficSource::OrganicSearch);
        assert_eq!(source("/", Some("https://duckduckgo.com/")), TrafficSource::OrganicSearch);
        assert_eq!(
            source("/", Some("https://forum.example.org/thread/1")),
            TrafficSource::Referral
        );
        assert_eq!(source("/", None), TrafficSource::Direct);
    }

    #[test]
    fn test_internal_referrer_is_direct() {
        let log = derive(&event("/pricing", Some("https://yolyardim.example/")), false);
        assert_eq!(log.traffic_source, TrafficSource::Direct);
        assert_eq!(log.referrer.as_deref(), Some("https://yolyardim.example/"));
    }

    #[test]
    fn test_utm_parameters_are_extracted_and_path_is_clean() {
        let mut ev = event(
            "https://www.yolyardim.example/cekici?utm_source=Facebook&utm_campaign=spring",
            None,
        );
        ev.site_host = None;
        let log = derive(&ev, true);

        assert_eq!(log.page_path, "/cekici");
        assert_eq!(log.utm_source.as_deref(), Some("Facebook"));
        assert_eq!(log.utm_campaign.as_deref(), Some("spring"));
        assert_eq!(log.traffic_source, TrafficSource::Social);

        let mut explicit = event("/?utm_source=facebook", None);
        explicit.utm_source = Some("bing".to_string());
        assert_eq!(derive(&explicit, true).traffic_source, TrafficSource::OrganicSearch);
    }

    #[test]
    fn test_device_classification() {
        assert_eq!(classify_device(IPHONE), DeviceType::Mobile);
        assert_eq!(classify_device(ANDROID_PHONE), DeviceType::Mobile);
        assert_eq!(classify_device(IPAD), DeviceType::Tablet);
        assert_eq!(classify_device(ANDROID_TABLET), DeviceType::Tablet);
        assert_eq!(classify_device(DESKTOP), DeviceType::Desktop);
        assert_eq!(classify_device(""), DeviceType::Desktop);
    }

    #[test]
    fn test_scroll_and_bounce_derivation() {
        let mut ev = event("/", None);
        ev.scroll_depth = Some(140);
        ev.duration_seconds = Some(4);
        let landing = derive(&ev, true);
        assert_eq!(landing.scroll_depth, 100);
        assert!(landing.is_bounce);

        ev.scroll_depth = Some(-3);
        ev.duration_seconds = Some(45);
        let engaged = derive(&ev, true);
        assert_eq!(engaged.scroll_depth, 0);
        assert!(!engaged.is_bounce);

        ev.duration_seconds = Some(2);
        assert!(!derive(&ev, false).is_bounce);
    }

    #[tokio::test]
    async fn test_second_view_clears_bounce_and_summary_counts() {
        let db = DBService::new_in_memory().await.unwrap();
        let since = Utc::now() - Duration::minutes(5);

        let mut first = event("/", Some("https://www.google.com/"));
        first.duration_seconds = Some(3);
        first.scroll_depth = Some(50);
        let landing = ActivityTracker::record(&db.pool, &first).await.unwrap();
        assert!(landing.is_landing && landing.is_bounce);

        let mut second = event("/cekici", Some("https://www.yolyardim.example/"));
        second.duration_seconds = Some(30);
        second.scroll_depth = Some(100);
        let follow_up = ActivityTracker::record(&db.pool, &second).await.unwrap();
        assert!(!follow_up.is_landing);

        let mut other_session = event("/", None);
        other_session.session_id = "s-2".to_string();
        other_session.user_agent = Some(IPHONE.to_string());
        other_session.duration_seconds = Some(1);
        ActivityTracker::record(&db.pool, &other_session).await.unwrap();

        let summary = ActivityTracker::summary(&db.pool, since).await.unwrap();
        assert_eq!(summary.total_views, 3);
        assert_eq!(summary.unique_sessions, 2);
        assert_eq!(summary.landing_views, 2);
        assert!((summary.bounce_rate - 0.5).abs() < 1e-9);
        assert!((summary.avg_duration_seconds - 34.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.by_source.get("organic_search"), Some(&1));
        assert_eq!(summary.by_source.get("direct"), Some(&2));
        assert_eq!(summary.by_device.get("mobile"), Some(&1));
        assert_eq!(
            summary.top_pages[0],
            PageCount {
                page_path: "/".to_string(),
                views: 2
            }
        );
    }

    #[test]
    fn test_duration_is_clamped_to_a_day() {
        let mut ev = event("/", None);
        ev.duration_seconds = Some(i64::MAX);
        assert_eq!(derive(&ev, true).duration_seconds, MAX_DURATION_SECS);

        ev.duration_seconds = Some(i64::MIN);
        assert_eq!(derive(&ev, true).duration_seconds, 0);
    }

    #[test]
    fn test_summary_does_not_overflow_on_large_durations() {
        let log = |id: &str| ActivityLog {
            id: Uuid::new_v4(),
            session_id: id.to_string(),
            user_id: None,
            page_path: "/".to_string(),
            page_title: None,
            referrer: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            traffic_source: TrafficSource::Direct,
            device_type: DeviceType::Desktop,
            duration_seconds: i64::MAX,
            scroll_depth: 100,
            is_landing: true,
            is_bounce: false,
            created_at: Utc::now(),
        };

        let summary = summarize(&[log("a"), log("b")], Utc::now());
        assert_eq!(summary.total_views, 2);
        assert!(summary.avg_duration_seconds.is_finite());
        assert!(summary.avg_duration_seconds > 0.0);
        assert_eq!(summary.avg_scroll_depth, 100.0);
    }

    #[tokio::test]
    async fn test_huge_beacon_durations_keep_summary_readable() {
        let db = DBService::new_in_memory().await.unwrap();
        let since = Utc::now() - Duration::minutes(5);

        let mut ev = event("/", None);
        ev.duration_seconds = Some(i64::MAX);
        ActivityTracker::record(&db.pool, &ev).await.unwrap();
        ActivityTracker::record(&db.pool, &ev).await.unwrap();

        let summary = ActivityTracker::summary(&db.pool, since).await.unwrap();
        assert_eq!(summary.total_views, 2);
        assert_eq!(summary.avg_duration_seconds, MAX_DURATION_SECS as f64);
    }

    #[tokio::test]
    async fn test_concurrent_first_views_record_one_landing() {
        let db = DBService::new_in_memory().await.unwrap();
        let since = Utc::now() - Duration::minutes(5);
        let first = event("/", None);
        let second = event("/fiyatlar", None);

        let (a, b) = tokio::join!(
            ActivityTracker::record(&db.pool, &first),
            ActivityTracker::record(&db.pool, &second),
        );
        let landings = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|log| log.is_landing)
            .count();
        assert_eq!(landings, 1);

        let summary = ActivityTracker::summary(&db.pool, since).await.unwrap();
        assert_eq!(summary.landing_views, 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(&[], Utc::now());
        assert_eq!(summary.total_views, 0);
        assert_eq!(summary.bounce_rate, 0.0);
        assert!(summary.top_pages.is_empty());
    }

    #[tokio::test]
    async fn test_record_requires_session() {
        let db = DBService::new_in_memory().await.unwrap();
        let err = ActivityTracker::record(&db.pool, &PageViewEvent::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::Validation(_)));
    }
}
