use chrono::{Duration, NaiveDateTime};
use log::debug;

/// Infers an admission timestamp for every reading of one patient.
///
/// `times` must be ascending. A reading starts an admission when it and the
/// following reading are both inpatient and at most `max_gap` apart, and the
/// reading before it did not already satisfy that test. A patient seen only as
/// an inpatient is admitted at the first reading. Readings of a run carry its
/// admission; any other reading is tied to the next admission, or to the last
/// one when none follows.
pub fn infer_admissions(
    times: &[NaiveDateTime],
    inpatient: &[bool],
    max_gap: Duration,
) -> Vec<Option<NaiveDateTime>> {
    let n = times.len();
    let mut starts: Vec<Option<NaiveDateTime>> = vec![None; n];
    if n == 0 {
        return starts;
    }

    let run_flags: Vec<bool> = (0..n)
        .map(|i| {
            i + 1 < n
                && inpatient[i]
                && inpatient[i + 1]
                && times[i + 1] - times[i] <= max_gap
        })
        .collect();

    for i in 0..n {
        let previous = i > 0 && run_flags[i - 1];
        if run_flags[i] && !previous {
            starts[i] = Some(times[i]);
        }
    }

    if inpatient.iter().all(|&flag| flag) {
        starts[0] = Some(times[0]);
    }

    // Readings of a run carry its admission; the rest are filled afterwards.
    let mut admissions: Vec<Option<NaiveDateTime>> = vec![None; n];
    let mut current = None;
    for i in 0..n {
        if starts[i].is_some() {
            current = starts[i];
        }
        let in_run = starts[i].is_some() || run_flags[i] || (i > 0 && run_flags[i - 1]);
        if in_run {
            admissions[i] = current;
        }
    }

    fill_admissions(admissions)
}

fn fill_admissions(mut admissions: Vec<Option<NaiveDateTime>>) -> Vec<Option<NaiveDateTime>> {
    let mut next = None;
    for slot in admissions.iter_mut().rev() {
        match slot {
            Some(admission) => next = Some(*admission),
            None => *slot = next,
        }
    }

    let mut previous = None;
    for slot in admissions.iter_mut() {
        match slot {
            Some(admission) => previous = Some(*admission),
            None => *slot = previous,
        }
    }

    admissions
}

/// Numbers each distinct admission in chronological order, continuing from `next_id`.
pub fn number_encounters(
    admissions: &[Option<NaiveDateTime>],
    next_id: &mut u64,
) -> Vec<Option<u64>> {
    let mut distinct: Vec<NaiveDateTime> = admissions.iter().flatten().copied().collect();
    distinct.sort();
    distinct.dedup();

    let first_id = *next_id;
    *next_id += distinct.len() as u64;
    debug!("Numbered {} encounters starting at {}", distinct.len(), first_id);

    admissions
        .iter()
        .map(|admission| {
            admission.and_then(|time| {
                distinct
                    .binary_search(&time)
                    .ok()
                    .map(|position| first_id + position as u64)
            })
        })
        .collect()
}
