//! Variable storage for a function instance.
//!
//! Input slots (indexed and named) and pulled cells live in append-only
//! arenas. A slot's position never changes once created and a full
//! [`reset`](VariableStore::reset) is the only way to remove one, so
//! compiled bytecode can keep addressing cells by index across repeated
//! evaluations without rebinding.

use indexmap::IndexMap;

#[derive(Debug, Default)]
pub struct VariableStore {
    /// Slot names, in creation order; position is the slot index.
    names: Vec<String>,
    /// Input slot values, parallel to `names`.
    inputs: Vec<f64>,
    /// Pulled cells, in pull-connection order.
    pulled: Vec<f64>,
    /// Name to slot index, insertion-ordered.
    index: IndexMap<String, usize>,
    /// The shared time cell.
    time: f64,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_slot(&mut self, name: String) -> usize {
        let index = self.inputs.len();
        self.inputs.push(0.0);
        self.index.insert(name.clone(), index);
        self.names.push(name);
        index
    }

    /// Ensure a slot named `x{index}` exists; a no-op when it already does.
    ///
    /// On an all-indexed store this grows the arena contiguously from its
    /// current length, so `x0..=x{index}` all exist and stay aligned with
    /// their positions; gap slots stay at 0.0 until written. When named
    /// slots have broken the alignment the target slot is appended and
    /// remains addressable through the name table.
    pub fn add_indexed(&mut self, index: usize) {
        let name = format!("x{index}");
        if self.index.contains_key(&name) {
            return;
        }
        while self.inputs.len() < index {
            let fill = format!("x{}", self.inputs.len());
            if self.index.contains_key(&fill) {
                break;
            }
            self.push_slot(fill);
        }
        self.push_slot(name);
    }

    /// Append one slot under `name`; a no-op when it already exists.
    pub fn add_named(&mut self, name: &str) {
        if self.index.contains_key(name) {
            return;
        }
        self.push_slot(name.to_string());
    }

    /// Ensure a pulled cell `y{index}` exists and reset it to zero.
    pub fn add_pulled(&mut self, index: usize) {
        if index >= self.pulled.len() {
            self.pulled.resize(index + 1, 0.0);
        }
        self.pulled[index] = 0.0;
    }

    /// Write a pushed value into an input slot. Returns false when the
    /// index is out of range; the caller decides how to report that.
    pub fn set_input(&mut self, index: usize, value: f64) -> bool {
        match self.inputs.get_mut(index) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    pub fn input(&self, index: usize) -> Option<f64> {
        self.inputs.get(index).copied()
    }

    pub fn set_input_by_name(&mut self, name: &str, value: f64) -> bool {
        match self.index.get(name) {
            Some(&index) => {
                self.inputs[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn input_by_name(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|&index| self.inputs[index])
    }

    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Number of bound input slots (indexed and named).
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn name_indices(&self) -> impl Iterator<Item = (&str, usize)> {
        self.index.iter().map(|(name, &index)| (name.as_str(), index))
    }

    pub fn first_input_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn inputs(&self) -> &[f64] {
        &self.inputs
    }

    pub fn pulled(&self) -> &[f64] {
        &self.pulled
    }

    pub fn pulled_len(&self) -> usize {
        self.pulled.len()
    }

    /// Copy a pull response into the pulled cells, element by element, up
    /// to the shorter of the two. Extra response values are discarded and
    /// unmatched cells keep their previous values.
    pub fn apply_pulled(&mut self, values: &[f64]) {
        for (cell, value) in self.pulled.iter_mut().zip(values) {
            *cell = *value;
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Mutable access to every cell class at once, for derivative probing.
    pub fn cells_mut(&mut self) -> (&mut [f64], &mut [f64], &mut f64) {
        (&mut self.inputs, &mut self.pulled, &mut self.time)
    }

    /// Drop every slot and the name table. The time cell is left alone.
    pub fn reset(&mut self) {
        self.names.clear();
        self.inputs.clear();
        self.pulled.clear();
        self.index.clear();
    }
}
