mod common;

use common::{err_of, TestHarness};
use scrimhub::{
    scrims::{self, Board, NewScrim, Scrim, ScrimStatus, Transition},
    teams::{self, TeamRole},
    AppError, CallerIdentity,
};
use time::{macros::datetime, Duration, OffsetDateTime};

fn new_scrim(team_id: &str, date: OffsetDateTime) -> NewScrim {
    NewScrim {
        team_id: team_id.to_owned(),
        date: Some(date),
        rank_min: Some("Gold".to_owned()),
        rank_max: Some("Diamond".to_owned()),
        country: "Spain".to_owned(),
    }
}

fn challenge(team_id: &str) -> Transition {
    Transition::Challenge { challenger_team_id: team_id.to_owned() }
}

fn winner(team_id: &str) -> Transition {
    Transition::ReportWinner { winner_team_id: team_id.to_owned() }
}

struct League {
    h: TestHarness,
    fx: CallerIdentity,
    fy: CallerIdentity,
    x: String,
    y: String,
}

async fn league() -> League {
    league_in(TestHarness::new().await).await
}

async fn league_in(h: TestHarness) -> League {
    let fx = h.user("fx", None).await;
    let fy = h.user("fy", None).await;
    let x = h.team(&fx, "Team X").await;
    let y = h.team(&fy, "Team Y").await;
    League { h, fx, fy, x, y }
}

impl League {
    async fn post(&self) -> Scrim {
        scrims::create_scrim(&self.h.db_pool, &self.fx, new_scrim(&self.x, datetime!(2026-11-01 19:00 UTC)))
            .await
            .unwrap()
    }

    async fn stored(&self, scrim_id: &str) -> Scrim {
        scrims::find_scrims_for_team(&self.h.db_pool, &self.fx, &self.x)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.id == scrim_id)
            .expect("scrim in poster's history")
    }

    async fn record(&self, team_id: &str) -> (i64, i64) {
        sqlx::query_as("SELECT wins, losses FROM teams WHERE id = ?")
            .bind(team_id)
            .fetch_one(&self.h.db_pool)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn declined_scrims_take_no_more_challenges() {
    let l = league().await;
    let fz = l.h.user("fz", None).await;
    let z = l.h.team(&fz, "Team Z").await;
    let s = l.post().await;
    assert_eq!(s.status, ScrimStatus::Open);

    let challenged = scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, challenge(&l.y)).await.unwrap();
    assert_eq!(challenged.status, ScrimStatus::Challenged);
    assert_eq!(challenged.challenger_id.as_deref(), Some(l.y.as_str()));

    let declined = scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, Transition::Decline).await.unwrap();
    assert_eq!(declined.status, ScrimStatus::Declined);

    for (caller, team) in [(&l.fy, &l.y), (&fz, &z)] {
        let again = scrims::transition_scrim(&l.h.db_pool, caller, &s.id, challenge(team)).await;
        assert!(matches!(err_of(again), AppError::FailedPrecondition(_)));
    }

    let history = scrims::find_scrims_for_team(&l.h.db_pool, &l.fy, &l.y).await.unwrap();
    assert_eq!(history, vec![declined]);
}

#[tokio::test]
async fn full_lifecycle_settles_the_record() {
    let l = league().await;
    let s = l.post().await;

    scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, challenge(&l.y)).await.unwrap();
    let confirmed = scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, Transition::Accept).await.unwrap();
    assert_eq!(confirmed.team_b_id.as_deref(), Some(l.y.as_str()));

    let completed = scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, winner(&l.y)).await.unwrap();
    assert_eq!(completed.status, ScrimStatus::Completed);
    assert_eq!(completed.winner_id.as_deref(), Some(l.y.as_str()));
    assert_eq!(l.stored(&s.id).await, completed);

    assert_eq!(l.record(&l.y).await, (1, 0));
    assert_eq!(l.record(&l.x).await, (0, 1));

    for transition in [winner(&l.x), Transition::Accept, Transition::Decline] {
        let late = scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, transition).await;
        assert!(matches!(err_of(late), AppError::FailedPrecondition(_)));
    }
    assert_eq!(l.record(&l.x).await, (0, 1));

    // challenged and completed reach X's staff, accepted reaches Y's
    let kinds: Vec<(String, String)> = sqlx::query_as("SELECT user_id, kind FROM inbox ORDER BY created_at, kind")
        .fetch_all(&l.h.db_pool)
        .await
        .unwrap();
    assert!(kinds.contains(&("fx".to_owned(), "scrim_challenged".to_owned())));
    assert!(kinds.contains(&("fy".to_owned(), "scrim_accepted".to_owned())));
    assert!(kinds.contains(&("fx".to_owned(), "scrim_completed".to_owned())));
    assert_eq!(kinds.len(), 3);
}

#[tokio::test]
async fn only_staff_act() {
    let l = league().await;
    let member = l.h.user("mx", None).await;
    let coach = l.h.user("cx", None).await;
    teams::add_member(&l.h.db_pool, &l.fx, &l.x, "mx").await.unwrap();
    teams::add_member(&l.h.db_pool, &l.fx, &l.x, "cx").await.unwrap();
    teams::set_member_role(&l.h.db_pool, &l.fx, &l.x, "cx", TeamRole::Coach).await.unwrap();

    let posted = scrims::create_scrim(&l.h.db_pool, &member, new_scrim(&l.x, datetime!(2026-11-01 19:00 UTC))).await;
    assert!(matches!(err_of(posted), AppError::PermissionDenied(_)));
    let posted = scrims::create_scrim(&l.h.db_pool, &l.fx, new_scrim("ghost", datetime!(2026-11-01 19:00 UTC))).await;
    assert!(matches!(err_of(posted), AppError::NotFound(_)));

    let s = l.post().await;
    let as_other_team = scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, challenge(&l.y)).await;
    assert!(matches!(err_of(as_other_team), AppError::PermissionDenied(_)));
    let self_challenge = scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, challenge(&l.x)).await;
    assert!(matches!(err_of(self_challenge), AppError::FailedPrecondition(_)));

    scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, challenge(&l.y)).await.unwrap();
    let by_challenger = scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, Transition::Accept).await;
    assert!(matches!(err_of(by_challenger), AppError::PermissionDenied(_)));
    let by_member = scrims::transition_scrim(&l.h.db_pool, &member, &s.id, Transition::Accept).await;
    assert!(matches!(err_of(by_member), AppError::PermissionDenied(_)));

    scrims::transition_scrim(&l.h.db_pool, &coach, &s.id, Transition::Accept).await.unwrap();
    let outsider = l.h.user("o", None).await;
    let by_outsider = scrims::transition_scrim(&l.h.db_pool, &outsider, &s.id, winner(&l.x)).await;
    assert!(matches!(err_of(by_outsider), AppError::PermissionDenied(_)));
    let bad_winner = scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, winner("ghost")).await;
    assert!(matches!(err_of(bad_winner), AppError::InvalidArgument(_)));

    let missing = scrims::transition_scrim(&l.h.db_pool, &l.fx, "nope", Transition::Accept).await;
    assert!(matches!(err_of(missing), AppError::NotFound(_)));
    let anonymous = scrims::transition_scrim(&l.h.db_pool, &CallerIdentity::Anonymous, &s.id, Transition::Accept).await;
    assert!(matches!(err_of(anonymous), AppError::Unauthenticated(_)));
}

#[tokio::test]
async fn one_rank_bound_covers_both() {
    let l = league().await;
    let only_min = NewScrim { rank_max: None, ..new_scrim(&l.x, datetime!(2026-11-01 19:00 UTC)) };

    let s = scrims::create_scrim(&l.h.db_pool, &l.fx, only_min).await.unwrap();
    assert_eq!(s.rank_min.as_deref(), Some("Gold"));
    assert_eq!(s.rank_max.as_deref(), Some("Gold"));

    let no_country = NewScrim { country: " ".to_owned(), ..new_scrim(&l.x, datetime!(2026-11-01 19:00 UTC)) };
    let err = scrims::create_scrim(&l.h.db_pool, &l.fx, no_country).await;
    assert!(matches!(err_of(err), AppError::InvalidArgument(_)));
    let no_date = NewScrim { date: None, ..new_scrim(&l.x, datetime!(2026-11-01 19:00 UTC)) };
    assert!(matches!(err_of(scrims::create_scrim(&l.h.db_pool, &l.fx, no_date).await), AppError::InvalidArgument(_)));
}

#[tokio::test]
async fn boards_list_soonest_first() {
    let l = league().await;
    let day = datetime!(2026-11-01 19:00 UTC);

    let later = scrims::create_scrim(&l.h.db_pool, &l.fx, new_scrim(&l.x, day + Duration::days(2))).await.unwrap();
    let sooner = scrims::create_scrim(&l.h.db_pool, &l.fx, new_scrim(&l.x, day)).await.unwrap();
    let french = NewScrim { country: "France".to_owned(), ..new_scrim(&l.x, day + Duration::days(1)) };
    let french = scrims::create_scrim(&l.h.db_pool, &l.fx, french).await.unwrap();

    let open: Vec<String> = scrims::list_board(&l.h.db_pool, Board::Open, None)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(open, [sooner.id.clone(), french.id.clone(), later.id.clone()]);

    let spain = scrims::list_board(&l.h.db_pool, Board::Open, Some("Spain")).await.unwrap();
    assert_eq!(spain.len(), 2);

    scrims::transition_scrim(&l.h.db_pool, &l.fy, &later.id, challenge(&l.y)).await.unwrap();
    scrims::transition_scrim(&l.h.db_pool, &l.fx, &later.id, Transition::Accept).await.unwrap();
    let confirmed = scrims::list_board(&l.h.db_pool, Board::Confirmed, None).await.unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].id, later.id);
    assert_eq!(scrims::list_board(&l.h.db_pool, Board::Open, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn team_history_merges_every_role() {
    let l = league().await;
    let fz = l.h.user("fz", None).await;
    let z = l.h.team(&fz, "Team Z").await;
    let day = datetime!(2026-11-01 19:00 UTC);

    // X posts two, Y plays one and challenges the other; Z posts one Y plays
    let played = scrims::create_scrim(&l.h.db_pool, &l.fx, new_scrim(&l.x, day)).await.unwrap();
    let pending = scrims::create_scrim(&l.h.db_pool, &l.fx, new_scrim(&l.x, day + Duration::days(1))).await.unwrap();
    let away = scrims::create_scrim(&l.h.db_pool, &fz, new_scrim(&z, day + Duration::days(2))).await.unwrap();
    let _open = scrims::create_scrim(&l.h.db_pool, &l.fy, new_scrim(&l.y, day)).await.unwrap();

    scrims::transition_scrim(&l.h.db_pool, &l.fy, &played.id, challenge(&l.y)).await.unwrap();
    scrims::transition_scrim(&l.h.db_pool, &l.fx, &played.id, Transition::Accept).await.unwrap();
    scrims::transition_scrim(&l.h.db_pool, &l.fy, &pending.id, challenge(&l.y)).await.unwrap();
    scrims::transition_scrim(&l.h.db_pool, &l.fy, &away.id, challenge(&l.y)).await.unwrap();
    scrims::transition_scrim(&l.h.db_pool, &fz, &away.id, Transition::Accept).await.unwrap();

    let history: Vec<(String, ScrimStatus)> = scrims::find_scrims_for_team(&l.h.db_pool, &l.fy, &l.y)
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.id, s.status))
        .collect();
    assert_eq!(
        history,
        [
            (away.id, ScrimStatus::Confirmed),
            (pending.id, ScrimStatus::Challenged),
            (played.id, ScrimStatus::Confirmed),
        ],
    );
}

#[tokio::test]
async fn cancel_until_confirmed() {
    let l = league().await;
    let s = l.post().await;

    let by_challenger = scrims::cancel_scrim(&l.h.db_pool, &l.fy, &s.id).await;
    assert!(matches!(err_of(by_challenger), AppError::PermissionDenied(_)));
    scrims::cancel_scrim(&l.h.db_pool, &l.fx, &s.id).await.unwrap();
    assert!(matches!(err_of(scrims::cancel_scrim(&l.h.db_pool, &l.fx, &s.id).await), AppError::NotFound(_)));

    let s = l.post().await;
    scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, challenge(&l.y)).await.unwrap();
    scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, Transition::Accept).await.unwrap();
    let confirmed = scrims::cancel_scrim(&l.h.db_pool, &l.fx, &s.id).await;
    assert!(matches!(err_of(confirmed), AppError::FailedPrecondition(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_challengers_get_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::on_disk(dir.path()).await;
    let fx = h.user("fx", None).await;
    let fy = h.user("fy", None).await;
    let fz = h.user("fz", None).await;
    let x = h.team(&fx, "Team X").await;
    let y = h.team(&fy, "Team Y").await;
    let z = h.team(&fz, "Team Z").await;

    for _ in 0..10 {
        let s = scrims::create_scrim(&h.db_pool, &fx, new_scrim(&x, datetime!(2026-11-01 19:00 UTC))).await.unwrap();

        let (by_y, by_z) = tokio::join!(
            scrims::transition_scrim(&h.db_pool, &fy, &s.id, challenge(&y)),
            scrims::transition_scrim(&h.db_pool, &fz, &s.id, challenge(&z)),
        );

        let (won, lost) = match (by_y, by_z) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
            other => panic!("expected exactly one challenge to land: {other:?}"),
        };
        assert!(matches!(lost, AppError::FailedPrecondition(_)));

        let board = scrims::find_scrims_for_team(&h.db_pool, &fx, &x).await.unwrap();
        let stored = board.into_iter().find(|scrim| scrim.id == s.id).unwrap();
        assert_eq!(stored.challenger_id, won.challenger_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accept_and_decline_race_to_one_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let l = league_in(TestHarness::on_disk(dir.path()).await).await;

    for _ in 0..10 {
        let s = l.post().await;
        scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, challenge(&l.y)).await.unwrap();

        let (accepted, declined) = tokio::join!(
            scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, Transition::Accept),
            scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, Transition::Decline),
        );

        let (won, lost) = match (accepted, declined) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
            other => panic!("expected exactly one answer to land: {other:?}"),
        };
        assert!(matches!(lost, AppError::FailedPrecondition(_)));
        assert!(matches!(won.status, ScrimStatus::Confirmed | ScrimStatus::Declined));
        assert_eq!(l.stored(&s.id).await.status, won.status);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_result_report_counts_once() {
    let dir = tempfile::tempdir().unwrap();
    let l = league_in(TestHarness::on_disk(dir.path()).await).await;

    for round in 1..=10 {
        let s = l.post().await;
        scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, challenge(&l.y)).await.unwrap();
        scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, Transition::Accept).await.unwrap();

        let (by_x, by_y) = tokio::join!(
            scrims::transition_scrim(&l.h.db_pool, &l.fx, &s.id, winner(&l.x)),
            scrims::transition_scrim(&l.h.db_pool, &l.fy, &s.id, winner(&l.y)),
        );

        let (won, lost) = match (by_x, by_y) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
            other => panic!("expected exactly one report to land: {other:?}"),
        };
        assert!(matches!(lost, AppError::FailedPrecondition(_)));
        assert_eq!(won.status, ScrimStatus::Completed);
        assert_eq!(l.stored(&s.id).await.winner_id, won.winner_id);

        let (x_wins, x_losses) = l.record(&l.x).await;
        let (y_wins, y_losses) = l.record(&l.y).await;
        assert_eq!(x_wins + y_wins, round);
        assert_eq!(x_losses + y_losses, round);
        assert_eq!(x_wins, y_losses);
    }
}
