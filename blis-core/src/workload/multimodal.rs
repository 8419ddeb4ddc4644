//! Composite multimodal input sampling

use crate::error::{Error, Result};
use crate::workload::spec::MultimodalSpec;
use blis_common::{DistSpec, LengthDistribution, ModalityTokens};
use rand::Rng;

/// Item-count and per-item token distributions for one non-text modality
#[derive(Debug, Clone)]
struct ItemSampler {
    count: LengthDistribution,
    tokens: LengthDistribution,
}

impl ItemSampler {
    fn build(
        tokens: &Option<DistSpec>,
        count: &Option<DistSpec>,
        name: &str,
        path: &str,
    ) -> Result<Option<Self>> {
        let (Some(tokens), Some(count)) = (tokens, count) else {
            return Ok(None);
        };
        Ok(Some(Self {
            count: build(count, &format!("{path}.{name}_count_distribution"))?,
            tokens: build(tokens, &format!("{path}.{name}_distribution"))?,
        }))
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let items = self.count.sample(rng);
        (0..items).fold(0u32, |acc, _| acc.saturating_add(self.tokens.sample(rng)))
    }
}

/// Samples per-modality token counts for a multimodal client
#[derive(Debug, Clone)]
pub struct MultimodalSampler {
    text: Option<LengthDistribution>,
    image: Option<ItemSampler>,
    audio: Option<ItemSampler>,
    video: Option<ItemSampler>,
}

impl MultimodalSampler {
    pub fn from_spec(spec: &MultimodalSpec, path: &str) -> Result<Self> {
        let text = spec
            .text_distribution
            .as_ref()
            .map(|d| build(d, &format!("{path}.text_distribution")))
            .transpose()?;
        Ok(Self {
            text,
            image: ItemSampler::build(
                &spec.image_distribution,
                &spec.image_count_distribution,
                "image",
                path,
            )?,
            audio: ItemSampler::build(
                &spec.audio_distribution,
                &spec.audio_count_distribution,
                "audio",
                path,
            )?,
            video: ItemSampler::build(
                &spec.video_distribution,
                &spec.video_count_distribution,
                "video",
                path,
            )?,
        })
    }

    /// Draw token counts in text, image, audio, video order
    ///
    /// A modality that is not fully configured contributes zero.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ModalityTokens {
        let text = self.text.as_ref().map_or(0, |d| d.sample(rng));
        let image = self.image.as_ref().map_or(0, |s| s.sample(rng));
        let audio = self.audio.as_ref().map_or(0, |s| s.sample(rng));
        let video = self.video.as_ref().map_or(0, |s| s.sample(rng));
        ModalityTokens { text, image, audio, video }
    }
}

/// Combined input length; never less than one token
pub fn total_input_len(tokens: &ModalityTokens) -> usize {
    tokens.total().clamp(1, u32::MAX as u64) as usize
}

fn build(spec: &DistSpec, path: &str) -> Result<LengthDistribution> {
    LengthDistribution::from_spec(spec).map_err(|e| Error::spec(format!("{path}: {e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::rng_from_seed;

    fn spec() -> MultimodalSpec {
        MultimodalSpec {
            text_distribution: Some(DistSpec::constant(100.0)),
            image_distribution: Some(DistSpec::constant(576.0)),
            image_count_distribution: Some(DistSpec::constant(2.0)),
            audio_distribution: Some(DistSpec::constant(50.0)),
            audio_count_distribution: None,
            video_distribution: None,
            video_count_distribution: None,
        }
    }

    #[test]
    fn test_text_plus_images() {
        let sampler = MultimodalSampler::from_spec(&spec(), "multimodal").unwrap();
        let mut rng = rng_from_seed(1);
        let tokens = sampler.sample(&mut rng);
        assert_eq!(tokens, ModalityTokens { text: 100, image: 1152, audio: 0, video: 0 });
        assert_eq!(total_input_len(&tokens), 1252);
    }

    #[test]
    fn test_audio_without_count_ignored() {
        let mut s = spec();
        s.audio_count_distribution = Some(DistSpec::constant(3.0));
        let sampler = MultimodalSampler::from_spec(&s, "multimodal").unwrap();
        let tokens = sampler.sample(&mut rng_from_seed(1));
        assert_eq!(tokens.audio, 150);
    }

    #[test]
    fn test_empty_spec_is_one_token() {
        let sampler = MultimodalSampler::from_spec(&MultimodalSpec::default(), "mm").unwrap();
        let tokens = sampler.sample(&mut rng_from_seed(3));
        assert_eq!(tokens, ModalityTokens::default());
        assert_eq!(total_input_len(&tokens), 1);
    }

    #[test]
    fn test_bad_distribution_names_path() {
        let mut s = spec();
        s.image_count_distribution = Some(DistSpec::new(blis_common::DistKind::Exponential));
        let err = MultimodalSampler::from_spec(&s, "clients[3].multimodal").unwrap_err();
        assert!(err.to_string().contains("clients[3].multimodal.image_count_distribution"));
    }

    #[test]
    fn test_sampling_deterministic() {
        let mut s = spec();
        s.text_distribution = Some(DistSpec::exponential(200.0));
        s.image_count_distribution = Some(DistSpec::exponential(3.0));
        let sampler = MultimodalSampler::from_spec(&s, "mm").unwrap();
        let a: Vec<_> = {
            let mut rng = rng_from_seed(9);
            (0..50).map(|_| sampler.sample(&mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = rng_from_seed(9);
            (0..50).map(|_| sampler.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }
}
