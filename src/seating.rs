use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

// Sanity caps on stored hall dimensions. Documents beyond these are
// rejected as malformed rather than allocated.
pub const SESSION_MAX_ROWS: usize = 1000;
pub const SESSION_MAX_COLS: usize = 256;

/// One student record. Exactly one copy exists per student: either in a
/// grid cell or in the unallocated list, never both. `extra` carries wire
/// fields we do not interpret so a save never drops backend data.
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_no: Option<String>,
    pub subject: Option<String>,
    pub hall_id: Option<String>,
    pub row: Option<usize>,
    pub col: Option<usize>,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct SessionHall {
    pub id: String,
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub kind: String,
    pub grid: Vec<Vec<Option<Student>>>,
}

#[derive(Debug, Clone, Default)]
pub struct EditorState {
    pub halls: Vec<SessionHall>,
    pub unallocated: Vec<Student>,
    pub selected_hall_id: Option<String>,
}

/// Counters for the builder's best-effort recoveries. Reported to the
/// client alongside the opened session and logged as warnings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub bench_fallbacks: usize,
    pub dropped_slots: usize,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("document has no halls object")]
    MissingHalls,
    #[error("hall {0}: {1}")]
    BadHall(String, String),
}

#[derive(Debug, Error)]
pub enum SeatingError {
    #[error("unknown hall: {0}")]
    UnknownHall(String),
    #[error("seat ({row},{col}) is outside hall {hall}")]
    SeatOutOfBounds { hall: String, row: usize, col: usize },
    #[error("unknown student: {0}")]
    UnknownStudent(String),
    #[error("a student with id {0} already exists")]
    DuplicateStudent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferSource {
    List { student_id: String },
    Seat { hall_id: String, row: usize, col: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    Seat { hall_id: String, row: usize, col: usize },
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Seated,
    Swapped,
    Unallocated,
    Noop,
}

impl TransferOutcome {
    pub fn action(self) -> &'static str {
        match self {
            TransferOutcome::Seated => "seat",
            TransferOutcome::Swapped => "swap",
            TransferOutcome::Unallocated => "unallocate",
            TransferOutcome::Noop => "noop",
        }
    }

    pub fn changed(self) -> bool {
        !matches!(self, TransferOutcome::Noop)
    }
}

/// An open customization session: the exam it belongs to plus the mutable
/// editor state. Dropped on close or when its exam is deleted.
#[derive(Debug)]
pub struct SeatingSession {
    pub exam_id: String,
    pub exam_name: String,
    pub state: EditorState,
    pub stats: BuildStats,
    pub dirty: bool,
}

/// Numeric-aware name ordering, so "Hall 9" sorts before "Hall 10" and
/// "301" before "302". Digit runs compare as numbers, everything else as
/// characters.
pub fn natural_name_cmp(a: &str, b: &str) -> Ordering {
    let mut ia = a.chars().peekable();
    let mut ib = b.chars().peekable();
    loop {
        match (ia.peek().copied(), ib.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_digit_run(&mut ia);
                let nb = take_digit_run(&mut ib);
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta
                    .len()
                    .cmp(&tb.len())
                    .then_with(|| ta.cmp(tb))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                if ca != cb {
                    return ca.cmp(&cb);
                }
                ia.next();
                ib.next();
            }
        }
    }
}

fn take_digit_run(it: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut out = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        out.push(c);
        it.next();
    }
    out
}

fn value_as_str(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn clear_placement(student: &mut Student) {
    student.hall_id = None;
    student.row = None;
    student.col = None;
}

/// Accepts the bench column hint as a number or a numeric string; the
/// backend is not consistent about which it sends.
fn slot_bench(slot: &Map<String, Value>) -> Option<i64> {
    match slot.get("bench") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

const SLOT_WIRE_KEYS: [&str; 4] = ["roll", "name", "subject", "bench"];
const SLOT_INTERNAL_KEYS: [&str; 4] = ["id", "hallId", "row", "col"];

fn slot_extra(slot: &Map<String, Value>) -> Map<String, Value> {
    slot.iter()
        .filter(|(k, _)| {
            !SLOT_WIRE_KEYS.contains(&k.as_str()) && !SLOT_INTERNAL_KEYS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn slot_to_student(slot: &Map<String, Value>, fallback_id: String) -> Student {
    let roll = value_as_str(slot.get("roll")).filter(|s| !s.is_empty());
    Student {
        id: roll.clone().unwrap_or(fallback_id),
        name: value_as_str(slot.get("name")).unwrap_or_default(),
        roll_no: roll,
        subject: value_as_str(slot.get("subject")),
        hall_id: None,
        row: None,
        col: None,
        extra: slot_extra(slot),
    }
}

/// Grid Model Builder: turns the stored exam document (halls keyed by
/// name, each row encoded as a sparse `rowN` array) into dense grids.
///
/// Occupied slots place at `bench - 1` when a bench hint is present,
/// else at their array index. The index fallback is a best-effort repair
/// of missing bench data and can misplace students when the source row
/// was itself sparse or reordered, so every use of it is counted and
/// logged rather than trusted. Slots resolving outside `[0, columns)`
/// are dropped and counted, never a crash.
pub fn build_state(doc: &Value) -> Result<(EditorState, BuildStats), BuildError> {
    let halls_obj = doc
        .get("halls")
        .and_then(|v| v.as_object())
        .ok_or(BuildError::MissingHalls)?;

    let mut stats = BuildStats::default();
    let mut halls: Vec<SessionHall> = Vec::with_capacity(halls_obj.len());

    for (hall_name, hall_val) in halls_obj {
        let hall_obj = hall_val.as_object().ok_or_else(|| {
            BuildError::BadHall(hall_name.clone(), "hall value must be an object".to_string())
        })?;
        let rows = hall_obj.get("rows").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let columns = hall_obj
            .get("columns")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        if rows == 0 || columns == 0 {
            return Err(BuildError::BadHall(
                hall_name.clone(),
                "rows and columns must be positive".to_string(),
            ));
        }
        if rows > SESSION_MAX_ROWS || columns > SESSION_MAX_COLS {
            return Err(BuildError::BadHall(
                hall_name.clone(),
                format!(
                    "grid {}x{} exceeds limits {}x{}",
                    rows, columns, SESSION_MAX_ROWS, SESSION_MAX_COLS
                ),
            ));
        }

        let mut grid: Vec<Vec<Option<Student>>> = vec![vec![None; columns]; rows];

        for (r, grid_row) in grid.iter_mut().enumerate() {
            let Some(entries) = hall_obj.get(&format!("row{}", r)).and_then(|v| v.as_array())
            else {
                continue;
            };
            for (i, entry) in entries.iter().enumerate() {
                let Some(slot) = entry.as_object() else {
                    continue;
                };
                let col = match slot_bench(slot) {
                    Some(bench) => bench - 1,
                    None => {
                        stats.bench_fallbacks += 1;
                        tracing::warn!(
                            hall = hall_name.as_str(),
                            row = r,
                            index = i,
                            "slot has no bench, falling back to array index"
                        );
                        i as i64
                    }
                };
                if col < 0 || col as usize >= columns {
                    stats.dropped_slots += 1;
                    tracing::warn!(
                        hall = hall_name.as_str(),
                        row = r,
                        col,
                        columns,
                        "slot column out of range, dropping"
                    );
                    continue;
                }
                let col = col as usize;
                if grid_row[col].is_some() {
                    // Two slots claimed the same seat; last one wins,
                    // the displaced record counts as dropped.
                    stats.dropped_slots += 1;
                    tracing::warn!(
                        hall = hall_name.as_str(),
                        row = r,
                        col,
                        "duplicate bench target, displacing earlier slot"
                    );
                }
                let mut student =
                    slot_to_student(slot, format!("s_{}_{}_{}", hall_name, r, col));
                student.hall_id = Some(hall_name.clone());
                student.row = Some(r);
                student.col = Some(col);
                grid_row[col] = Some(student);
            }
        }

        halls.push(SessionHall {
            id: hall_name.clone(),
            name: hall_name.clone(),
            rows,
            columns,
            kind: value_as_str(hall_obj.get("type")).unwrap_or_default(),
            grid,
        });
    }

    halls.sort_by(|a, b| natural_name_cmp(&a.name, &b.name));

    let mut unallocated: Vec<Student> = Vec::new();
    if let Some(list) = doc.get("unallocated").and_then(|v| v.as_array()) {
        for (i, entry) in list.iter().enumerate() {
            let Some(slot) = entry.as_object() else {
                continue;
            };
            unallocated.push(slot_to_student(slot, format!("u_{}", i)));
        }
    }

    let selected_hall_id = halls.first().map(|h| h.id.clone());
    Ok((
        EditorState {
            halls,
            unallocated,
            selected_hall_id,
        },
        stats,
    ))
}

impl EditorState {
    fn hall_index(&self, hall_id: &str) -> Result<usize, SeatingError> {
        self.halls
            .iter()
            .position(|h| h.id == hall_id)
            .ok_or_else(|| SeatingError::UnknownHall(hall_id.to_string()))
    }

    fn check_seat(&self, hall_idx: usize, row: usize, col: usize) -> Result<(), SeatingError> {
        let hall = &self.halls[hall_idx];
        if row >= hall.rows || col >= hall.columns {
            return Err(SeatingError::SeatOutOfBounds {
                hall: hall.id.clone(),
                row,
                col,
            });
        }
        Ok(())
    }

    fn place(&mut self, hall_idx: usize, row: usize, col: usize, mut student: Student) {
        let hall = &mut self.halls[hall_idx];
        student.hall_id = Some(hall.id.clone());
        student.row = Some(row);
        student.col = Some(col);
        hall.grid[row][col] = Some(student);
    }

    /// Transfer Engine: applies one drag/drop gesture. The only mutation
    /// path for seat assignments, so the one-occupant-per-cell and
    /// no-duplication/no-loss invariants are enforced here and nowhere
    /// else. Runs synchronously; there is never a second transfer in
    /// flight.
    pub fn apply_transfer(
        &mut self,
        from: TransferSource,
        to: TransferTarget,
    ) -> Result<TransferOutcome, SeatingError> {
        #[cfg(debug_assertions)]
        let ids_before = self.student_ids();
        let outcome = self.transfer_inner(from, to)?;
        #[cfg(debug_assertions)]
        assert_eq!(
            self.student_ids(),
            ids_before,
            "transfer lost or duplicated a student"
        );
        Ok(outcome)
    }

    fn transfer_inner(
        &mut self,
        from: TransferSource,
        to: TransferTarget,
    ) -> Result<TransferOutcome, SeatingError> {
        // Validate both ends before touching anything so a failed
        // transfer leaves the state untouched.
        if let TransferSource::Seat { hall_id, row, col } = &from {
            let idx = self.hall_index(hall_id)?;
            self.check_seat(idx, *row, *col)?;
        }
        if let TransferTarget::Seat { hall_id, row, col } = &to {
            let idx = self.hall_index(hall_id)?;
            self.check_seat(idx, *row, *col)?;
        }

        match (from, to) {
            (
                TransferSource::Seat {
                    hall_id: sh,
                    row: sr,
                    col: sc,
                },
                TransferTarget::Seat {
                    hall_id: th,
                    row: tr,
                    col: tc,
                },
            ) => {
                if sh == th && sr == tr && sc == tc {
                    return Ok(TransferOutcome::Noop);
                }
                let src_idx = self.hall_index(&sh)?;
                let tgt_idx = self.hall_index(&th)?;
                let Some(dragged) = self.halls[src_idx].grid[sr][sc].take() else {
                    return Ok(TransferOutcome::Noop);
                };
                match self.halls[tgt_idx].grid[tr][tc].take() {
                    Some(occupant) => {
                        self.place(tgt_idx, tr, tc, dragged);
                        self.place(src_idx, sr, sc, occupant);
                        Ok(TransferOutcome::Swapped)
                    }
                    None => {
                        self.place(tgt_idx, tr, tc, dragged);
                        Ok(TransferOutcome::Seated)
                    }
                }
            }
            (
                TransferSource::List { student_id },
                TransferTarget::Seat {
                    hall_id: th,
                    row: tr,
                    col: tc,
                },
            ) => {
                let tgt_idx = self.hall_index(&th)?;
                let pos = self
                    .unallocated
                    .iter()
                    .position(|s| s.id == student_id)
                    .ok_or(SeatingError::UnknownStudent(student_id))?;
                let dragged = self.unallocated.remove(pos);
                if let Some(mut occupant) = self.halls[tgt_idx].grid[tr][tc].take() {
                    clear_placement(&mut occupant);
                    self.unallocated.push(occupant);
                }
                self.place(tgt_idx, tr, tc, dragged);
                Ok(TransferOutcome::Seated)
            }
            (
                TransferSource::Seat {
                    hall_id: sh,
                    row: sr,
                    col: sc,
                },
                TransferTarget::List,
            ) => {
                let src_idx = self.hall_index(&sh)?;
                let Some(mut dragged) = self.halls[src_idx].grid[sr][sc].take() else {
                    return Ok(TransferOutcome::Noop);
                };
                clear_placement(&mut dragged);
                self.unallocated.push(dragged);
                Ok(TransferOutcome::Unallocated)
            }
            (TransferSource::List { .. }, TransferTarget::List) => Ok(TransferOutcome::Noop),
        }
    }

    fn find_student_mut(&mut self, student_id: &str) -> Option<&mut Student> {
        if let Some(pos) = self.unallocated.iter().position(|s| s.id == student_id) {
            return self.unallocated.get_mut(pos);
        }
        for hall in &mut self.halls {
            for row in &mut hall.grid {
                for cell in row {
                    if cell.as_ref().is_some_and(|s| s.id == student_id) {
                        return cell.as_mut();
                    }
                }
            }
        }
        None
    }

    fn id_exists(&self, student_id: &str) -> bool {
        self.unallocated.iter().any(|s| s.id == student_id)
            || self.halls.iter().any(|h| {
                h.grid
                    .iter()
                    .any(|row| row.iter().flatten().any(|s| s.id == student_id))
            })
    }

    /// Adds a hand-entered student to the unallocated list. The id comes
    /// from the roll number when given, else a fresh UUID.
    pub fn add_student(
        &mut self,
        name: String,
        roll_no: Option<String>,
    ) -> Result<&Student, SeatingError> {
        let roll_no = roll_no.filter(|s| !s.is_empty());
        let id = roll_no
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.id_exists(&id) {
            return Err(SeatingError::DuplicateStudent(id));
        }
        self.unallocated.push(Student {
            id,
            name,
            roll_no,
            subject: None,
            hall_id: None,
            row: None,
            col: None,
            extra: Map::new(),
        });
        Ok(self.unallocated.last().expect("just pushed"))
    }

    /// Renames / re-rolls a student wherever it currently sits. The id is
    /// stable across edits even when the roll number changes.
    pub fn update_student(
        &mut self,
        student_id: &str,
        name: Option<String>,
        roll_no: Option<String>,
    ) -> Result<(), SeatingError> {
        let student = self
            .find_student_mut(student_id)
            .ok_or_else(|| SeatingError::UnknownStudent(student_id.to_string()))?;
        if let Some(name) = name {
            student.name = name;
        }
        if let Some(roll) = roll_no {
            student.roll_no = if roll.is_empty() { None } else { Some(roll) };
        }
        Ok(())
    }

    /// Removes a student from the allocation entirely: its seat becomes
    /// empty, or it leaves the unallocated list.
    pub fn remove_student(&mut self, student_id: &str) -> Result<(), SeatingError> {
        if let Some(pos) = self.unallocated.iter().position(|s| s.id == student_id) {
            self.unallocated.remove(pos);
            return Ok(());
        }
        for hall in &mut self.halls {
            for row in &mut hall.grid {
                for cell in row.iter_mut() {
                    if cell.as_ref().is_some_and(|s| s.id == student_id) {
                        *cell = None;
                        return Ok(());
                    }
                }
            }
        }
        Err(SeatingError::UnknownStudent(student_id.to_string()))
    }

    pub fn select_hall(&mut self, hall_id: &str) -> Result<(), SeatingError> {
        let idx = self.hall_index(hall_id)?;
        self.selected_hall_id = Some(self.halls[idx].id.clone());
        Ok(())
    }

    pub fn seated_count(&self) -> usize {
        self.halls
            .iter()
            .map(|h| h.grid.iter().map(|r| r.iter().flatten().count()).sum::<usize>())
            .sum()
    }

    /// All student ids across grids and the unallocated list, sorted.
    /// A conservation check compares this multiset before and after a
    /// sequence of transfers.
    pub fn student_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .halls
            .iter()
            .flat_map(|h| h.grid.iter().flat_map(|r| r.iter().flatten()))
            .map(|s| s.id.clone())
            .chain(self.unallocated.iter().map(|s| s.id.clone()))
            .collect();
        ids.sort();
        ids
    }

    fn student_snapshot(student: &Student) -> Value {
        json!({
            "id": student.id,
            "name": student.name,
            "rollNo": student.roll_no,
            "subject": student.subject,
            "hallId": student.hall_id,
            "row": student.row,
            "col": student.col,
            "bench": student.col.map(|c| c + 1),
        })
    }

    /// Read-only view for the UI. Grid cells carry display fields only;
    /// preserved backend extras stay internal until the next save.
    pub fn snapshot(&self) -> Value {
        let halls: Vec<Value> = self
            .halls
            .iter()
            .map(|hall| {
                let grid: Vec<Value> = hall
                    .grid
                    .iter()
                    .map(|row| {
                        Value::Array(
                            row.iter()
                                .map(|cell| match cell {
                                    Some(s) => Self::student_snapshot(s),
                                    None => Value::Null,
                                })
                                .collect(),
                        )
                    })
                    .collect();
                json!({
                    "id": hall.id,
                    "name": hall.name,
                    "rows": hall.rows,
                    "columns": hall.columns,
                    "type": hall.kind,
                    "grid": grid,
                })
            })
            .collect();
        json!({
            "halls": halls,
            "unallocated": self
                .unallocated
                .iter()
                .map(Self::student_snapshot)
                .collect::<Vec<_>>(),
            "selectedHallId": self.selected_hall_id,
        })
    }

    fn student_wire(student: &Student, bench: Option<usize>) -> Value {
        let mut obj = student.extra.clone();
        obj.insert("name".to_string(), json!(student.name));
        if let Some(roll) = &student.roll_no {
            obj.insert("roll".to_string(), json!(roll));
        }
        if let Some(subject) = &student.subject {
            obj.insert("subject".to_string(), json!(subject));
        }
        if let Some(bench) = bench {
            obj.insert("bench".to_string(), json!(bench));
        }
        Value::Object(obj)
    }

    /// Payload Serializer: the structural inverse of `build_state`.
    /// Flattens each dense grid back into the row-keyed sparse wire
    /// format, renaming `rollNo` back to `roll` and stripping the
    /// in-memory bookkeeping fields. Pure: the editor state is unchanged;
    /// persisting the result is the caller's separate step.
    pub fn serialize_document(&self, exam_id: &str) -> Value {
        let mut halls = Map::new();
        for hall in &self.halls {
            let mut obj = Map::new();
            obj.insert("rows".to_string(), json!(hall.rows));
            obj.insert("columns".to_string(), json!(hall.columns));
            obj.insert("type".to_string(), json!(hall.kind));
            for (r, row) in hall.grid.iter().enumerate() {
                let cells: Vec<Value> = row
                    .iter()
                    .enumerate()
                    .map(|(c, cell)| match cell {
                        Some(s) => Self::student_wire(s, Some(c + 1)),
                        None => Value::Null,
                    })
                    .collect();
                obj.insert(format!("row{}", r), Value::Array(cells));
            }
            halls.insert(hall.name.clone(), Value::Object(obj));
        }
        json!({
            "examId": exam_id,
            "halls": halls,
            "unallocated": self
                .unallocated
                .iter()
                .map(|s| Self::student_wire(s, None))
                .collect::<Vec<_>>(),
        })
    }
}
