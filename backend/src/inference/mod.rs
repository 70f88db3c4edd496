pub mod labels;
pub mod manifest;
pub mod model;
pub mod preprocess;
pub mod quality;

use model::{Classifier, InferenceError, argmax, softmax};

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: &'static str,
    pub confidence: f32,
}

/// Preprocesses the image, runs the classifier and maps the arg-max logit
/// through the label vocabulary.
pub fn predict(classifier: &dyn Classifier, image_data: &[u8]) -> Result<Prediction, InferenceError> {
    let input = preprocess::preprocess_image(image_data)?;
    let logits = classifier.logits(&input)?;

    let expected = labels::NUM_CLASSES;
    if logits.len() != expected {
        return Err(InferenceError::OutputShape {
            expected,
            actual: logits.len(),
        });
    }

    if let Some(position) = logits.iter().position(|v| !v.is_finite()) {
        return Err(InferenceError::NonFiniteOutput(position));
    }

    let index = argmax(&logits).ok_or(InferenceError::OutputShape {
        expected,
        actual: 0,
    })?;
    let label = labels::label_for_index(index).ok_or(InferenceError::OutputShape {
        expected,
        actual: logits.len(),
    })?;
    let confidence = softmax(&logits)[index];

    log::info!("Prediction completed: {} ({:.1}%)", label, confidence * 100.0);
    Ok(Prediction {
        index,
        label,
        confidence,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::Array4;

    /// Returns fixed logits with a single hot class.
    pub(crate) struct FixedClassifier {
        pub hot: usize,
        pub width: usize,
    }

    impl Classifier for FixedClassifier {
        fn logits(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let mut logits = vec![0.0; self.width];
            if let Some(slot) = logits.get_mut(self.hot) {
                *slot = 10.0;
            }
            Ok(logits)
        }

        fn num_classes(&self) -> usize {
            self.width
        }
    }

    #[test]
    fn maps_hot_logit_through_vocabulary() {
        let classifier = FixedClassifier { hot: 1, width: 38 };
        let image = quality::tests::solid_png(300, 300, 180);
        let prediction = predict(&classifier, &image).unwrap();
        assert_eq!(prediction.label, "Apple___Black_rot");
        assert_eq!(prediction.index, 1);
        assert!(prediction.confidence > 0.9);
    }

    #[test]
    fn wrong_logit_count_is_an_inference_error() {
        let classifier = FixedClassifier { hot: 0, width: 10 };
        let image = quality::tests::solid_png(300, 300, 180);
        assert!(matches!(
            predict(&classifier, &image),
            Err(InferenceError::OutputShape {
                expected: 38,
                actual: 10
            })
        ));
    }

    /// Puts NaN next to a strong regular class.
    pub(crate) struct NanClassifier;

    impl Classifier for NanClassifier {
        fn logits(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let mut logits = vec![0.0; 38];
            logits[1] = 10.0;
            logits[5] = f32::NAN;
            Ok(logits)
        }

        fn num_classes(&self) -> usize {
            38
        }
    }

    #[test]
    fn non_finite_logits_are_an_inference_error() {
        let image = quality::tests::solid_png(300, 300, 180);
        assert!(matches!(
            predict(&NanClassifier, &image),
            Err(InferenceError::NonFiniteOutput(5))
        ));
    }

    #[test]
    fn undecodable_image_surfaces_as_preprocessing_error() {
        let classifier = FixedClassifier { hot: 0, width: 38 };
        assert!(matches!(
            predict(&classifier, b"nope"),
            Err(InferenceError::Preprocessing(_))
        ));
    }
}
