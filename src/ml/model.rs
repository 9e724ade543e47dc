use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid, tanh},
};

/// The contract the training and evaluation loops rely on.
///
/// `forward` returns one disparity map per stage, ordered from the
/// coarsest to the most refined, each shaped [batch, 1, height, width].
pub trait StageModel<B: Backend>: Module<B> {
    fn forward(&self, left: Tensor<B, 4>, right: Tensor<B, 4>) -> Vec<Tensor<B, 4>>;
}

// Stage 0 regresses at 1/16 of the candidate resolution, the two
// refinements at 1/8 and 1/4.
const LEVEL_SCALES: [f64; 3] = [16.0, 8.0, 4.0];
const SPN_RANGE: f64 = 2.0;

#[derive(Config, Debug)]
pub struct AnytimeStereoConfig {
    /// Disparity candidates per level: [coarse, refine 1, refine 2]
    pub max_disp_list:     Vec<usize>,
    #[config(default = 3)]
    pub image_channels:    usize,
    #[config(default = 1)]
    pub init_channels:     usize,
    #[config(default = 2)]
    pub nblocks:           usize,
    #[config(default = false)]
    pub with_spn:          bool,
    #[config(default = 8)]
    pub spn_init_channels: usize,
}

impl AnytimeStereoConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AnytimeStereoNet<B> {
        let width = self.init_channels.max(1) * 4;
        let conv = |c_in: usize, c_out: usize| {
            Conv2dConfig::new([c_in, c_out], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };

        let features = (0..self.nblocks.max(1))
            .map(|i| conv(if i == 0 { self.image_channels } else { width }, width))
            .collect();

        // Context = left features ‖ |left − right| features.
        let context = 2 * width;
        let coarse_head = conv(context, 1);
        let refine_heads = (1..3)
            .map(|level| RefineHead {
                conv:  conv(context + 1, 1),
                range: self.max_disp_list[level] as f64 * LEVEL_SCALES[level],
            })
            .collect();
        let spn = self.with_spn.then(|| SpnHead {
            expand:  conv(context + 1, self.spn_init_channels),
            project: conv(self.spn_init_channels, 1),
        });

        AnytimeStereoNet {
            features,
            coarse_head,
            refine_heads,
            spn,
            coarse_range: self.max_disp_list[0] as f64 * LEVEL_SCALES[0],
        }
    }
}

#[derive(Module, Debug)]
pub struct RefineHead<B: Backend> {
    pub conv:  Conv2d<B>,
    pub range: f64,
}

#[derive(Module, Debug)]
pub struct SpnHead<B: Backend> {
    pub expand:  Conv2d<B>,
    pub project: Conv2d<B>,
}

/// Small multi-stage disparity regressor used by the CLI.
///
/// Stage 0 predicts an absolute disparity in `[0, coarse_range]`;
/// every later stage adds a bounded residual to the previous one.
#[derive(Module, Debug)]
pub struct AnytimeStereoNet<B: Backend> {
    pub features:     Vec<Conv2d<B>>,
    pub coarse_head:  Conv2d<B>,
    pub refine_heads: Vec<RefineHead<B>>,
    pub spn:          Option<SpnHead<B>>,
    pub coarse_range: f64,
}

impl<B: Backend> AnytimeStereoNet<B> {
    fn extract(&self, image: Tensor<B, 4>) -> Tensor<B, 4> {
        self.features
            .iter()
            .fold(image, |x, conv| relu(conv.forward(x)))
    }

    fn guided(&self, context: &Tensor<B, 4>, disp: &Tensor<B, 4>) -> Tensor<B, 4> {
        Tensor::cat(
            vec![context.clone(), disp.clone().div_scalar(self.coarse_range)],
            1,
        )
    }
}

impl<B: Backend> StageModel<B> for AnytimeStereoNet<B> {
    fn forward(&self, left: Tensor<B, 4>, right: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let fl = self.extract(left);
        let fr = self.extract(right);
        let cost    = (fl.clone() - fr).abs();
        let context = Tensor::cat(vec![fl, cost], 1);

        let mut disp = sigmoid(self.coarse_head.forward(context.clone()))
            .mul_scalar(self.coarse_range);
        let mut outputs = vec![disp.clone()];

        for head in &self.refine_heads {
            let residual = tanh(head.conv.forward(self.guided(&context, &disp)))
                .mul_scalar(head.range);
            disp = relu(disp + residual);
            outputs.push(disp.clone());
        }

        if let Some(spn) = &self.spn {
            let hidden   = relu(spn.expand.forward(self.guided(&context, &disp)));
            let residual = tanh(spn.project.forward(hidden)).mul_scalar(SPN_RANGE);
            outputs.push(relu(disp + residual));
        }

        outputs
    }
}
