// ============================================================
// Layer 5 — Recurrent Cells and Encoders
// ============================================================
// Step-wise GRU and LSTM cells built from orthogonally
// initialized linear layers, a stacked cell for multi-layer
// single-step updates (pointer network), and a masked
// bidirectional RNN over packed sequences (sentence encoding).
//
// Variable lengths are handled by carry-forward masking: past a
// row's true length the state stops updating and the emitted
// output is zeroed, which matches what packed recurrent
// computation produces for the valid prefix.
//
// Reference: Cho et al. (2014) GRU, Hochreiter & Schmidhuber
//            (1997) LSTM

use burn::{
    nn::{Dropout, DropoutConfig, Linear},
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::ml::init::OrthogonalPolicy;
use crate::ml::sequence::PackedSequence;

// ─── Cell type selection ──────────────────────────────────────────────────────

/// Which recurrent cell a component builds. Fixed at construction.
#[derive(Config, Debug, PartialEq)]
pub enum CellType {
    Gru,
    Lstm,
}

impl CellType {
    pub fn build<B: Backend>(
        &self,
        input_size: usize,
        hidden_size: usize,
        device: &B::Device,
    ) -> RnnCell<B> {
        match self {
            CellType::Gru => RnnCell::Gru(GruCell::new(input_size, hidden_size, device)),
            CellType::Lstm => RnnCell::Lstm(LstmCell::new(input_size, hidden_size, device)),
        }
    }
}

// ─── Cell state ───────────────────────────────────────────────────────────────

/// Runtime state threaded through a recurrent scan. GRU carries only
/// the hidden vector; LSTM additionally carries the cell vector.
#[derive(Debug, Clone)]
pub struct CellState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell: Option<Tensor<B, 2>>,
}

impl<B: Backend> CellState<B> {
    /// Blend `next` into `prev` under a [batch, 1] step mask: rows with
    /// mask 1 take the update, rows with mask 0 keep their old state.
    pub(crate) fn blend(prev: &Self, next: Self, step_mask: &Tensor<B, 2>) -> Self {
        let keep = step_mask.clone().mul_scalar(-1.0).add_scalar(1.0);
        Self {
            hidden: next.hidden * step_mask.clone() + prev.hidden.clone() * keep.clone(),
            cell: match (&prev.cell, next.cell) {
                (Some(prev_cell), Some(next_cell)) => {
                    Some(next_cell * step_mask.clone() + prev_cell.clone() * keep)
                }
                _ => None,
            },
        }
    }
}

// ─── GRU cell ─────────────────────────────────────────────────────────────────

/// Single-step gated recurrent unit.
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    /// input -> reset | update | candidate, stacked as one [in, 3H] map
    input_gates: Linear<B>,
    /// hidden -> reset | update | candidate
    hidden_gates: Linear<B>,
    hidden_size: usize,
}

impl<B: Backend> GruCell<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let policy = OrthogonalPolicy::default();
        Self {
            input_gates: policy.linear(input_size, 3 * hidden_size, true, device),
            hidden_gates: policy.linear(hidden_size, 3 * hidden_size, true, device),
            hidden_size,
        }
    }

    pub fn step(&self, input: Tensor<B, 2>, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let from_input = self.input_gates.forward(input).chunk(3, 1);
        let from_hidden = self.hidden_gates.forward(hidden.clone()).chunk(3, 1);

        let reset = sigmoid(from_input[0].clone() + from_hidden[0].clone());
        let update = sigmoid(from_input[1].clone() + from_hidden[1].clone());
        let candidate = (from_input[2].clone() + reset * from_hidden[2].clone()).tanh();

        // h' = (1 - z) * n + z * h
        (hidden - candidate.clone()) * update + candidate
    }
}

// ─── LSTM cell ────────────────────────────────────────────────────────────────

/// Single-step long short-term memory cell.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    /// input -> input | forget | candidate | output gates, [in, 4H]
    input_gates: Linear<B>,
    hidden_gates: Linear<B>,
    hidden_size: usize,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let policy = OrthogonalPolicy::default();
        Self {
            input_gates: policy.linear(input_size, 4 * hidden_size, true, device),
            hidden_gates: policy.linear(hidden_size, 4 * hidden_size, true, device),
            hidden_size,
        }
    }

    pub fn step(
        &self,
        input: Tensor<B, 2>,
        hidden: Tensor<B, 2>,
        cell: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let gates = self.input_gates.forward(input) + self.hidden_gates.forward(hidden);
        let gates = gates.chunk(4, 1);

        let input_gate = sigmoid(gates[0].clone());
        let forget_gate = sigmoid(gates[1].clone());
        let candidate = gates[2].clone().tanh();
        let output_gate = sigmoid(gates[3].clone());

        let cell = forget_gate * cell + input_gate * candidate;
        let hidden = output_gate * cell.clone().tanh();
        (hidden, cell)
    }
}

// ─── Unified cell ─────────────────────────────────────────────────────────────

/// A recurrent cell of either kind behind one `step` interface.
#[derive(Module, Debug)]
pub enum RnnCell<B: Backend> {
    Gru(GruCell<B>),
    Lstm(LstmCell<B>),
}

impl<B: Backend> RnnCell<B> {
    pub fn hidden_size(&self) -> usize {
        match self {
            RnnCell::Gru(cell) => cell.hidden_size,
            RnnCell::Lstm(cell) => cell.hidden_size,
        }
    }

    /// Zero state for a batch, with a cell vector only for LSTM.
    pub fn init_state(&self, batch: usize, device: &B::Device) -> CellState<B> {
        let hidden = Tensor::zeros([batch, self.hidden_size()], device);
        let cell = match self {
            RnnCell::Gru(_) => None,
            RnnCell::Lstm(_) => Some(Tensor::zeros([batch, self.hidden_size()], device)),
        };
        CellState { hidden, cell }
    }

    /// Seed a state from an existing hidden vector (pointer network
    /// initializes from the question summary).
    pub fn state_from_hidden(&self, hidden: Tensor<B, 2>) -> CellState<B> {
        let cell = match self {
            RnnCell::Gru(_) => None,
            RnnCell::Lstm(_) => Some(Tensor::zeros_like(&hidden)),
        };
        CellState { hidden, cell }
    }

    pub fn step(&self, input: Tensor<B, 2>, state: CellState<B>) -> CellState<B> {
        match self {
            RnnCell::Gru(cell) => CellState {
                hidden: cell.step(input, state.hidden),
                cell: None,
            },
            RnnCell::Lstm(cell) => {
                let memory = state
                    .cell
                    .unwrap_or_else(|| Tensor::zeros_like(&state.hidden));
                let (hidden, memory) = cell.step(input, state.hidden, memory);
                CellState {
                    hidden,
                    cell: Some(memory),
                }
            }
        }
    }
}

// ─── Stacked cell ─────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct StackedCellConfig {
    #[config(default = 1)]
    pub num_layers: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = false)]
    pub residual: bool,
    #[config(default = "CellType::Gru")]
    pub cell: CellType,
}

impl StackedCellConfig {
    pub fn init<B: Backend>(
        &self,
        input_size: usize,
        hidden_size: usize,
        device: &B::Device,
    ) -> StackedCell<B> {
        assert!(self.num_layers >= 1, "a stacked cell needs at least one layer");
        let layers = (0..self.num_layers)
            .map(|layer| {
                let layer_input = if layer == 0 { input_size } else { hidden_size };
                self.cell.build(layer_input, hidden_size, device)
            })
            .collect();
        StackedCell {
            layers,
            dropout: DropoutConfig::new(self.dropout).init(),
            residual: self.residual,
        }
    }
}

/// One or more recurrent cells applied in sequence for a single time
/// step, with inter-layer dropout and optional residual additions
/// between layers of equal width.
#[derive(Module, Debug)]
pub struct StackedCell<B: Backend> {
    layers: Vec<RnnCell<B>>,
    dropout: Dropout,
    residual: bool,
}

impl<B: Backend> StackedCell<B> {
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn init_states(&self, batch: usize, device: &B::Device) -> Vec<CellState<B>> {
        self.layers
            .iter()
            .map(|cell| cell.init_state(batch, device))
            .collect()
    }

    /// Seed every layer's state from the same hidden vector.
    pub fn states_from_hidden(&self, hidden: Tensor<B, 2>) -> Vec<CellState<B>> {
        self.layers
            .iter()
            .map(|cell| cell.state_from_hidden(hidden.clone()))
            .collect()
    }

    /// Advance all layers by one step.
    ///
    /// # Panics
    /// Panics if `states` does not hold one state per layer.
    pub fn step(
        &self,
        input: Tensor<B, 2>,
        states: Vec<CellState<B>>,
    ) -> (Tensor<B, 2>, Vec<CellState<B>>) {
        assert_eq!(
            states.len(),
            self.layers.len(),
            "stacked cell has {} layers but {} states were given",
            self.layers.len(),
            states.len(),
        );

        let mut current = input;
        let mut next_states = Vec::with_capacity(self.layers.len());

        for (layer, (cell, state)) in self.layers.iter().zip(states).enumerate() {
            if layer > 0 {
                current = self.dropout.forward(current);
            }
            let previous = current.clone();
            let state = cell.step(current, state);
            current = state.hidden.clone();
            // Hidden-to-hidden residual; the first layer's input width
            // may differ from the hidden width, so it is skipped.
            if self.residual && layer > 0 {
                current = current + previous;
            }
            next_states.push(state);
        }

        (current, next_states)
    }
}

// ─── Masked bidirectional RNN ─────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct RnnConfig {
    pub hidden_size: usize,
    #[config(default = 1)]
    pub num_layers: usize,
    #[config(default = true)]
    pub bidirectional: bool,
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = "CellType::Gru")]
    pub cell: CellType,
}

impl RnnConfig {
    pub fn output_size(&self) -> usize {
        self.hidden_size * if self.bidirectional { 2 } else { 1 }
    }

    pub fn init<B: Backend>(&self, input_size: usize, device: &B::Device) -> Rnn<B> {
        assert!(self.num_layers >= 1, "an rnn needs at least one layer");
        assert!(self.hidden_size > 0, "rnn hidden size must be positive");

        let layers = (0..self.num_layers)
            .map(|layer| {
                let layer_input = if layer == 0 {
                    input_size
                } else {
                    self.output_size()
                };
                RnnLayer {
                    forward: self.cell.build(layer_input, self.hidden_size, device),
                    backward: self
                        .bidirectional
                        .then(|| self.cell.build(layer_input, self.hidden_size, device)),
                }
            })
            .collect();

        Rnn {
            layers,
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
struct RnnLayer<B: Backend> {
    forward: RnnCell<B>,
    backward: Option<RnnCell<B>>,
}

/// Stacked (bi)directional recurrent encoder over a packed sequence.
/// Output states at padded positions are zero.
#[derive(Module, Debug)]
pub struct Rnn<B: Backend> {
    layers: Vec<RnnLayer<B>>,
    dropout: Dropout,
}

impl<B: Backend> Rnn<B> {
    pub fn forward(&self, input: &PackedSequence<B>) -> PackedSequence<B> {
        let step_mask = input.step_mask();
        let mut sequence = input.tensor.clone();

        for (index, layer) in self.layers.iter().enumerate() {
            if index > 0 {
                sequence = self.dropout.forward(sequence);
            }
            let forward_states = scan(&layer.forward, &sequence, &step_mask, false);
            sequence = match &layer.backward {
                Some(backward_cell) => Tensor::cat(
                    vec![forward_states, scan(backward_cell, &sequence, &step_mask, true)],
                    2,
                ),
                None => forward_states,
            };
        }

        PackedSequence::new(sequence, input.lengths.clone())
    }
}

/// Run one cell over the time axis of `sequence`, masked by `step_mask`.
/// `reverse` scans right-to-left (outputs are returned in left-to-right
/// order either way). Emitted states at padded positions are zeroed.
pub(crate) fn scan<B: Backend>(
    cell: &RnnCell<B>,
    sequence: &Tensor<B, 3>,
    step_mask: &Tensor<B, 2>,
    reverse: bool,
) -> Tensor<B, 3> {
    let [batch, steps, features] = sequence.dims();
    let device = sequence.device();

    let mut state = cell.init_state(batch, &device);
    let mut outputs: Vec<Tensor<B, 2>> = Vec::with_capacity(steps);

    let order: Vec<usize> = if reverse {
        (0..steps).rev().collect()
    } else {
        (0..steps).collect()
    };

    for t in order {
        let input = sequence
            .clone()
            .slice([0..batch, t..t + 1, 0..features])
            .reshape([batch, features]);
        let mask_t = step_mask.clone().slice([0..batch, t..t + 1]);

        let next = cell.step(input, state.clone());
        state = CellState::blend(&state, next, &mask_t);
        outputs.push(state.hidden.clone() * mask_t);
    }

    if reverse {
        outputs.reverse();
    }
    Tensor::stack::<3>(outputs, 1)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::documents::BatchOrder;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn random(shape: [usize; 3]) -> Tensor<TB, 3> {
        Tensor::random(shape, burn::tensor::Distribution::Normal(0.0, 1.0), &device())
    }

    #[test]
    fn test_gru_step_shape() {
        let cell = GruCell::<TB>::new(6, 4, &device());
        let hidden = cell.step(
            Tensor::zeros([3, 6], &device()),
            Tensor::zeros([3, 4], &device()),
        );
        assert_eq!(hidden.dims(), [3, 4]);
    }

    #[test]
    fn test_lstm_step_shapes() {
        let cell = LstmCell::<TB>::new(6, 4, &device());
        let (hidden, memory) = cell.step(
            Tensor::zeros([2, 6], &device()),
            Tensor::zeros([2, 4], &device()),
            Tensor::zeros([2, 4], &device()),
        );
        assert_eq!(hidden.dims(), [2, 4]);
        assert_eq!(memory.dims(), [2, 4]);
    }

    #[test]
    fn test_state_stops_updating_past_length() {
        // Batch of 2, lengths [4, 2]: the short row's state after step 2
        // must not change any further.
        let cell = CellType::Gru.build::<TB>(3, 5, &device());
        let sequence = random([2, 4, 3]);
        let mask = crate::ml::sequence::length_mask::<TB>(&[4, 2], 4, &device());

        let states = scan(&cell, &sequence, &mask, false);
        let values = states.into_data().to_vec::<f32>().unwrap();

        // Padded positions emit zeros for the short row
        let row = 1;
        for t in 2..4 {
            for f in 0..5 {
                assert_eq!(values[(row * 4 + t) * 5 + f], 0.0);
            }
        }
    }

    #[test]
    fn test_rnn_bidirectional_output_size() {
        let lengths = vec![5, 3];
        let order = BatchOrder::from_lengths(&lengths);
        let pack = PackedSequence::pack(random([2, 5, 6]), &order, &lengths);

        let rnn = RnnConfig::new(4).init::<TB>(6, &device());
        let encoded = rnn.forward(&pack);

        assert_eq!(encoded.tensor.dims(), [2, 5, 8]);
        assert_eq!(encoded.lengths, vec![5, 3]);
    }

    #[test]
    fn test_stacked_cell_step() {
        let stacked = StackedCellConfig::new()
            .with_num_layers(2)
            .with_residual(true)
            .init::<TB>(6, 4, &device());

        let states = stacked.init_states(3, &device());
        let (output, states) = stacked.step(Tensor::zeros([3, 6], &device()), states);

        assert_eq!(output.dims(), [3, 4]);
        assert_eq!(states.len(), 2);
    }

    #[test]
    #[should_panic]
    fn test_stacked_cell_rejects_wrong_state_count() {
        let stacked = StackedCellConfig::new()
            .with_num_layers(2)
            .init::<TB>(6, 4, &device());
        let states = stacked.init_states(3, &device());
        let _ = stacked.step(Tensor::zeros([3, 6], &device()), states[..1].to_vec());
    }

    #[test]
    fn test_lstm_cell_type_builds_memory_state() {
        let cell = CellType::Lstm.build::<TB>(3, 4, &device());
        let state = cell.init_state(2, &device());
        assert!(state.cell.is_some());

        let next = cell.step(Tensor::zeros([2, 3], &device()), state);
        assert_eq!(next.hidden.dims(), [2, 4]);
    }
}
