// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The evaluation loop can hand rendering work to an external
// collaborator. It only promises correctly shaped, correctly
// cropped host arrays; what the collaborator does with them is
// outside the loop's correctness contract.
//
// The model contract lives in the ML layer (it is expressed in
// Burn tensors, which this layer does not import).

use anyhow::Result;

// ─── HostArray ────────────────────────────────────────────────────────────────
/// Dense row-major f32 array copied back from the compute device.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    pub shape:  Vec<usize>,
    pub values: Vec<f32>,
}

impl HostArray {
    /// `None` unless `values` holds exactly one entry per element of `shape`.
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Option<Self> {
        (shape.iter().product::<usize>() == values.len()).then(|| Self { shape, values })
    }

    /// Size of the leading (batch) dimension.
    pub fn batch_len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Contiguous slice for the `index`-th item of the leading dimension.
    pub fn item(&self, index: usize) -> &[f32] {
        let stride: usize = self.shape.iter().skip(1).product();
        &self.values[index * stride..(index + 1) * stride]
    }
}

// ─── VisualizationRequest ─────────────────────────────────────────────────────
/// Four aligned arrays for one evaluated batch.
///
/// Shapes: `left`/`right` are [B, C, H, W] and already cropped like
/// the prediction; `ground_truth` and `prediction` are [B, H, W].
#[derive(Debug, Clone)]
pub struct VisualizationRequest {
    pub batch_index:  usize,
    pub left:         HostArray,
    pub right:        HostArray,
    pub ground_truth: HostArray,
    pub prediction:   HostArray,
}

// ─── VisualizationSink ────────────────────────────────────────────────────────
/// Anything that accepts rendering requests from the evaluation loop.
///
/// Implementations:
///   - PngGridSink → writes a 2×2 PNG grid per batch item
pub trait VisualizationSink {
    fn submit(&mut self, request: VisualizationRequest) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_array_rejects_mismatched_buffers() {
        assert!(HostArray::new(vec![2, 3], vec![0.0; 5]).is_none());

        let a = HostArray::new(vec![2, 3], (0..6).map(|v| v as f32).collect()).unwrap();
        assert_eq!(a.batch_len(), 2);
        assert_eq!(a.item(1), &[3.0, 4.0, 5.0]);
    }
}
