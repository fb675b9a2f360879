/// Property tests for event scoring and prediction criteria
///
/// These tests verify, over generated series:
/// 1. Hits never exceed the observed events and account for all of them
/// 2. A trailing buffer never drops a predicted event
/// 3. Stricter persistence never adds notifications
/// 4. The "all leadtimes" selection is non-increasing in leadtime and
///    agrees with the single-leadtime selection

use chrono::NaiveDate;
use proptest::prelude::*;

use flood_skill::criteria::persistence::{LeadtimeSelection, apply_persistence, exceedance_to_events};
use flood_skill::exceedance::grid::{ExceedanceArray, LeadtimeGrid, TimeAxis};
use flood_skill::model::Persistence;
use flood_skill::scoring::buffer::{BufferWindow, count_events};
use flood_skill::scoring::hits::{PredictedCount, events_to_hits};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Observed onsets and a predicted series with gaps, of equal length.
fn paired_series() -> impl Strategy<Value = (Vec<bool>, Vec<Option<u8>>)> {
    (1usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(prop_oneof![Just(None), Just(Some(0u8)), Just(Some(1u8))], n),
        )
    })
}

fn cells() -> impl Strategy<Value = Vec<Option<bool>>> {
    prop::collection::vec(prop_oneof![Just(None), any::<bool>().prop_map(Some)], 1..20)
}

/// One exceedance profile over 6-hourly leadtimes, without gaps.
fn profile(values: Vec<f64>) -> ExceedanceArray {
    let leadtimes: Vec<u32> = (1..=values.len() as u32).map(|i| i * 6).collect();
    LeadtimeGrid::from_vec(
        vec!["A".to_string()],
        vec!["EUE".to_string()],
        vec![NaiveDate::from_ymd_opt(2021, 7, 14).unwrap().and_hms_opt(0, 0, 0).unwrap()],
        leadtimes,
        TimeAxis::Valid,
        values,
    )
    .unwrap()
}

proptest! {
    /// 0 <= TP <= observed events, and TP + FN == observed events
    #[test]
    fn hits_account_for_every_observed_event(
        (obs, pred) in paired_series(),
        window in 1usize..6,
        center in any::<bool>(),
        raw in any::<bool>(),
    ) {
        let buffer = BufferWindow::new(window, center).unwrap();
        let count = if raw { PredictedCount::Raw } else { PredictedCount::Buffered };
        let breakdown = events_to_hits(&obs, &pred, buffer, count).unwrap();
        let n_obs = count_events(&obs);

        prop_assert!(breakdown.hits.hits <= n_obs);
        prop_assert_eq!(breakdown.hits.hits + breakdown.hits.misses, n_obs);
        prop_assert_eq!(breakdown.buffered.len(), obs.len());
    }

    /// A trailing window keeps every positive forecast
    #[test]
    fn trailing_buffer_covers_predictions(
        pred in prop::collection::vec(any::<bool>(), 1..60),
        window in 1usize..6,
    ) {
        let buffered = BufferWindow::new(window, false).unwrap().apply(&pred);
        for (p, b) in pred.iter().zip(&buffered) {
            if *p {
                prop_assert_eq!(*b, 1);
            }
        }
    }

    /// (a + 1, b) notifies a subset of what (a, b) notifies
    #[test]
    fn persistence_is_monotone_in_positives(
        cells in cells(),
        window in 2usize..6,
        positives in 1usize..5,
    ) {
        prop_assume!(positives < window);
        let loose = apply_persistence(&cells, Persistence::new(positives, window).unwrap());
        let strict = apply_persistence(&cells, Persistence::new(positives + 1, window).unwrap());
        for (l, s) in loose.iter().zip(&strict) {
            prop_assert_eq!(l.is_none(), s.is_none());
            if *s == Some(true) {
                prop_assert_eq!(*l, Some(true));
            }
        }
    }

    /// Buckets of "all" never rise with leadtime and match `From(L)`
    #[test]
    fn all_selection_is_cumulative(
        values in prop::collection::vec(0.0f64..=1.0, 1..12),
        probability in 0.0f64..=1.0,
        pick in any::<prop::sample::Index>(),
    ) {
        let grid = profile(values);
        let all = exceedance_to_events(&grid, Some(probability), Persistence::single(), &LeadtimeSelection::All).unwrap();
        let row = all.row(0, 0, 0).to_vec();
        for pair in row.windows(2) {
            prop_assert!(pair[0] >= pair[1]);
        }

        let k = pick.index(row.len());
        let lt = grid.leadtimes()[k];
        let single = exceedance_to_events(&grid, Some(probability), Persistence::single(), &LeadtimeSelection::From(lt)).unwrap();
        prop_assert_eq!(single.row(0, 0, 0), &row[k..=k]);
    }
}
