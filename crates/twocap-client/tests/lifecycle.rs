//! End-to-end task lifecycle against a scripted transport

use std::time::Duration;
use tokio::time::Instant;
use twocap_client::{
    poll_options, CaptchaError, ElapsedMode, Endpoint, JobState, MockTransport, PollOptions,
    QueueStatsSource, RawResponse, TaskDescriptor, TwoCaptchaClient, PENDING_MARKER,
};

fn pending() -> RawResponse {
    RawResponse::new(false, PENDING_MARKER)
}

fn client_with(results: Vec<RawResponse>) -> TwoCaptchaClient<MockTransport> {
    let mut mock = MockTransport::new().with_response(
        Endpoint::CreateTask,
        None,
        RawResponse::new(true, "555"),
    );
    for result in results {
        mock = mock.with_response(Endpoint::TaskResult, Some("get2"), result);
    }
    TwoCaptchaClient::with_transport("key", mock)
}

fn task() -> TaskDescriptor {
    TaskDescriptor::recaptcha_v2("6Le-site", "https://example.com")
}

#[tokio::test(start_paused = true)]
async fn test_always_pending_times_out_after_three_sleeps() {
    let client = client_with(vec![pending()]);
    let mut job = client.create_task(&task()).await.unwrap();

    let start = Instant::now();
    let err = client.wait(&mut job, &poll_options(12, 5)).await.unwrap_err();

    assert!(
        matches!(err, CaptchaError::Timeout { max_wait } if max_wait == Duration::from_secs(12))
    );
    assert_eq!(start.elapsed(), Duration::from_secs(15));
    assert_eq!(
        client.transport().call_count(Endpoint::TaskResult, Some("get2")),
        3
    );
    assert_eq!(job.state(), &JobState::TimedOut);
    assert!(job.solve_time().is_none());
    assert!(job.last_result().unwrap().is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_ready_on_third_poll_freezes_elapsed() {
    let client = client_with(vec![
        pending(),
        pending(),
        RawResponse::new(true, "abc123|2990"),
    ]);
    let mut job = client.create_task(&task()).await.unwrap();

    let solution = client.wait(&mut job, &poll_options(300, 5)).await.unwrap();

    assert_eq!(solution.token, "abc123");
    assert_eq!(solution.cost, 2.99);
    assert_eq!(job.solution(), Some("abc123"));
    assert_eq!(job.cost(), Some(2.99));
    assert_eq!(job.solve_time(), Some(Duration::from_secs(10)));
    assert_eq!(
        client.transport().call_count(Endpoint::TaskResult, Some("get2")),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_ready_immediately_has_zero_elapsed() {
    let client = client_with(vec![RawResponse::new(true, "tok")]);
    let mut job = client.create_task(&task()).await.unwrap();

    let solution = client.wait(&mut job, &poll_options(300, 5)).await.unwrap();
    assert_eq!(solution.cost, 0.00299);
    assert_eq!(job.solve_time(), Some(Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn test_poll_error_is_not_retried() {
    let client = client_with(vec![
        pending(),
        RawResponse::new(false, "ERROR_CAPTCHA_UNSOLVABLE"),
        RawResponse::new(true, "never-seen"),
    ]);
    let mut job = client.create_task(&task()).await.unwrap();

    let err = client.wait(&mut job, &poll_options(300, 5)).await.unwrap_err();

    assert_eq!(err.remote_code(), Some("ERROR_CAPTCHA_UNSOLVABLE"));
    assert_eq!(
        client.transport().call_count(Endpoint::TaskResult, Some("get2")),
        2
    );
    assert!(matches!(job.state(), JobState::Errored { .. }));
    assert_eq!(job.last_result().unwrap().request, "ERROR_CAPTCHA_UNSOLVABLE");

    // Terminal jobs are not polled again
    let again = client.wait(&mut job, &poll_options(300, 5)).await;
    assert!(matches!(again, Err(CaptchaError::JobFinished { .. })));
    assert_eq!(
        client.transport().call_count(Endpoint::TaskResult, Some("get2")),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_wait_on_ready_job_returns_solution_without_polling() {
    let client = client_with(vec![RawResponse::new(true, "tok|1000")]);
    let mut job = client.create_task(&task()).await.unwrap();
    client.wait(&mut job, &poll_options(300, 5)).await.unwrap();

    let solution = client.wait(&mut job, &poll_options(300, 5)).await.unwrap();
    assert_eq!(solution.token, "tok");
    assert_eq!(solution.cost, 1.0);
    assert_eq!(
        client.transport().call_count(Endpoint::TaskResult, Some("get2")),
        1
    );
}

fn slow_client() -> TwoCaptchaClient<MockTransport> {
    let mock = MockTransport::new()
        .with_response(Endpoint::CreateTask, None, RawResponse::new(true, "555"))
        .with_response(Endpoint::TaskResult, Some("get2"), pending())
        .with_response(Endpoint::TaskResult, Some("get2"), RawResponse::new(true, "tok"))
        .with_latency(Duration::from_secs(2));
    TwoCaptchaClient::with_transport("key", mock)
}

#[tokio::test(start_paused = true)]
async fn test_stepped_mode_ignores_request_time() {
    let client = slow_client();
    let mut job = client.create_task(&task()).await.unwrap();

    client.wait(&mut job, &poll_options(300, 5)).await.unwrap();
    assert_eq!(job.solve_time(), Some(Duration::from_secs(5)));
}

#[tokio::test(start_paused = true)]
async fn test_wall_clock_mode_counts_request_time() {
    let client = slow_client();
    let mut job = client.create_task(&task()).await.unwrap();

    let options = poll_options(300, 5).with_mode(ElapsedMode::WallClock);
    client.wait(&mut job, &options).await.unwrap();

    // First poll (2s) plus one sleep (5s); the final poll is not counted
    assert_eq!(job.solve_time(), Some(Duration::from_secs(7)));
}

#[tokio::test(start_paused = true)]
async fn test_sub_second_max_wait_reported_exactly() {
    let client = client_with(vec![pending()]);
    let mut job = client.create_task(&task()).await.unwrap();

    let options = PollOptions::new(Duration::from_millis(500), Duration::from_secs(1));
    let err = client.wait(&mut job, &options).await.unwrap_err();

    assert!(
        matches!(err, CaptchaError::Timeout { max_wait } if max_wait == Duration::from_millis(500))
    );
    assert_eq!(
        err.to_string(),
        "The execution time exceeded a maximum time of 0.5 seconds"
    );
    assert_eq!(job.state(), &JobState::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_solve_then_report_bad() {
    let mock = MockTransport::new()
        .with_response(Endpoint::CreateTask, None, RawResponse::new(true, "900"))
        .with_response(Endpoint::TaskResult, Some("get2"), pending())
        .with_response(Endpoint::TaskResult, Some("get2"), RawResponse::new(true, "tok|3000"))
        .with_response(
            Endpoint::TaskResult,
            Some("reportbad"),
            RawResponse::new(true, "OK_REPORT_RECORDED"),
        );
    let client = TwoCaptchaClient::with_transport("key", mock);

    let job = client.solve(&task(), &poll_options(60, 2)).await.unwrap();
    assert_eq!(job.task_id(), "900");
    assert_eq!(job.cost(), Some(3.0));
    assert_eq!(job.solve_time(), Some(Duration::from_secs(2)));

    assert!(client.report_bad(&job).await.unwrap());
    assert!(job.is_ready());
}

#[tokio::test]
async fn test_queue_stats_through_client() {
    let page = r#"<div><b id="market-price">Bid</b><b id="market-price">0.5</b>
        <b id="block-size">Speed</b><b id="block-size">20s</b>
        <b id="tx-per-day">Load</b><b id="tx-per-day">40%</b>
        <b id="mempool-size">Workers</b><b id="mempool-size">250</b></div>"#;
    let client = TwoCaptchaClient::with_transport("key", MockTransport::new().with_page(200, page));

    let load = client.queue_stats().await.unwrap();
    assert_eq!(load.workers_total, 250);
    assert_eq!(load.busy_workers(), 100);
    assert_eq!(load.free_workers, 150);
    assert_eq!(load.speed_seconds, 20);
    assert_eq!(load.bid, 0.5);
}

#[tokio::test]
async fn test_queue_stats_bad_status() {
    let client =
        TwoCaptchaClient::with_transport("key", MockTransport::new().with_page(503, "down"));

    match client.queue_stats().await {
        Err(CaptchaError::ServiceUnavailable(msg)) => {
            assert_eq!(msg, "Response status code: 503")
        }
        other => panic!("expected ServiceUnavailable, got {:?}", other),
    }
}
