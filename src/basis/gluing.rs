use super::knots::BREAK_TOLERANCE;
use super::{Basis, BasisValues, BSplineBasis, Element};
use eyre::eyre;
use nalgebra::DMatrix;

/// Three univariate B-spline bases over the same interface, stacked into a single basis.
///
/// Function `i` of component `c` has the index `i + sum_{b < c} size(b)`. The components
/// typically represent the two gluing functions `alpha` of the adjacent patches and the
/// transversal function `beta`.
#[derive(Debug, Clone, PartialEq)]
pub struct GluingDataBasis {
    components: [BSplineBasis; 3],
}

impl GluingDataBasis {
    /// Stacks three bases. All components must share the same breakpoints so that their
    /// elements coincide.
    pub fn new(components: [BSplineBasis; 3]) -> eyre::Result<Self> {
        let reference = components[0].knots().breaks();
        for (c, component) in components.iter().enumerate().skip(1) {
            let breaks = component.knots().breaks();
            let same = breaks.len() == reference.len()
                && breaks
                    .iter()
                    .zip(&reference)
                    .all(|(a, b)| (a - b).abs() <= BREAK_TOLERANCE);
            if !same {
                return Err(eyre!(
                    "gluing data component {} has breakpoints {:?}, expected {:?}",
                    c,
                    breaks,
                    reference
                ));
            }
        }
        Ok(Self { components })
    }

    pub fn component(&self, c: usize) -> &BSplineBasis {
        &self.components[c]
    }

    /// Offset of the first function of component `c` in the stacked numbering.
    pub fn offset(&self, c: usize) -> usize {
        self.components[..c].iter().map(|b| b.size()).sum()
    }

    /// Number of active functions of each component on any element.
    pub fn num_active_per_component(&self) -> [usize; 3] {
        [
            self.components[0].knots().degree() + 1,
            self.components[1].knots().degree() + 1,
            self.components[2].knots().degree() + 1,
        ]
    }
}

impl Basis for GluingDataBasis {
    fn dim(&self) -> usize {
        1
    }

    fn size(&self) -> usize {
        self.components.iter().map(|b| b.size()).sum()
    }

    /// The largest degree among the components.
    fn degree(&self, _direction: usize) -> usize {
        self.components
            .iter()
            .map(|b| b.knots().degree())
            .max()
            .unwrap_or(0)
    }

    fn num_elements(&self) -> usize {
        self.components[0].num_elements()
    }

    fn element(&self, index: usize) -> Element {
        self.components[0].element(index)
    }

    fn active(&self, element: &Element) -> Vec<usize> {
        let mut active = Vec::new();
        for (c, component) in self.components.iter().enumerate() {
            let offset = self.offset(c);
            active.extend(component.active(element).into_iter().map(|i| i + offset));
        }
        active
    }

    fn eval_all_ders(&self, element: &Element, points: &DMatrix<f64>, order: usize) -> BasisValues {
        let parts: Vec<BasisValues> = self
            .components
            .iter()
            .map(|component| component.eval_all_ders(element, points, order))
            .collect();
        let total: usize = parts.iter().map(|part| part.num_active()).sum();
        let num_points = points.ncols();

        let mut values = DMatrix::zeros(total, num_points);
        let mut derivatives = if order >= 1 {
            vec![DMatrix::zeros(total, num_points)]
        } else {
            Vec::new()
        };
        let mut row = 0;
        for part in &parts {
            let n = part.num_active();
            values.rows_mut(row, n).copy_from(&part.values);
            if let (Some(target), Some(source)) = (derivatives.first_mut(), part.derivatives.first()) {
                target.rows_mut(row, n).copy_from(source);
            }
            row += n;
        }
        BasisValues { values, derivatives }
    }
}
