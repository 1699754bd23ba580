//! Multi-patch topology and the spline bases defined on it.

use crate::basis::{Basis, TensorBSplineBasis};
use crate::dof_mapper::{DofMapper, DofMapperBuilder};
use crate::geometry::{AffineBox, PatchGeometry};
use eyre::eyre;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A side of the parameter domain `[0, 1]^2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoxSide {
    /// `u = 0`
    West,
    /// `u = 1`
    East,
    /// `v = 0`
    South,
    /// `v = 1`
    North,
}

impl BoxSide {
    pub const ALL: [BoxSide; 4] = [BoxSide::West, BoxSide::East, BoxSide::South, BoxSide::North];

    pub fn opposite(self) -> Self {
        match self {
            Self::West => Self::East,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::North => Self::South,
        }
    }

    /// The parametric direction that is constant along the side.
    pub fn normal_direction(self) -> usize {
        match self {
            Self::West | Self::East => 0,
            Self::South | Self::North => 1,
        }
    }

    /// The parametric direction along the side.
    pub fn tangent_direction(self) -> usize {
        1 - self.normal_direction()
    }
}

/// A corner of the parameter domain, ordered as `(0, 0), (1, 0), (0, 1), (1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoxCorner {
    SouthWest,
    SouthEast,
    NorthWest,
    NorthEast,
}

impl BoxCorner {
    pub const ALL: [BoxCorner; 4] = [
        BoxCorner::SouthWest,
        BoxCorner::SouthEast,
        BoxCorner::NorthWest,
        BoxCorner::NorthEast,
    ];

    /// Whether the corner lies at the upper end of the `u` and `v` directions.
    pub fn is_upper(self) -> (bool, bool) {
        match self {
            Self::SouthWest => (false, false),
            Self::SouthEast => (true, false),
            Self::NorthWest => (false, true),
            Self::NorthEast => (true, true),
        }
    }

    pub fn param(self) -> Point2<f64> {
        let (u, v) = self.is_upper();
        Point2::new(u as u8 as f64, v as u8 as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchSide {
    pub patch: usize,
    pub side: BoxSide,
}

impl PatchSide {
    pub fn new(patch: usize, side: BoxSide) -> Self {
        Self { patch, side }
    }
}

/// Two glued patch sides. The sides must be opposite (east to west or north to south) and
/// the parametrizations along them must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub first: PatchSide,
    pub second: PatchSide,
}

impl Interface {
    pub fn new(first: PatchSide, second: PatchSide) -> Self {
        Self { first, second }
    }
}

#[derive(Debug, Clone)]
pub struct MultiPatch {
    patches: Vec<Arc<dyn PatchGeometry>>,
    interfaces: Vec<Interface>,
    boundaries: Vec<PatchSide>,
}

impl MultiPatch {
    pub fn new(
        patches: Vec<Arc<dyn PatchGeometry>>,
        interfaces: Vec<Interface>,
        boundaries: Vec<PatchSide>,
    ) -> eyre::Result<Self> {
        let num_patches = patches.len();
        for interface in &interfaces {
            for side in [interface.first, interface.second] {
                if side.patch >= num_patches {
                    return Err(eyre!("interface refers to patch {} of {}", side.patch, num_patches));
                }
            }
            if interface.first.side.opposite() != interface.second.side {
                return Err(eyre!(
                    "interface between {:?} and {:?} does not pair opposite sides",
                    interface.first,
                    interface.second
                ));
            }
        }
        if let Some(side) = boundaries.iter().find(|side| side.patch >= num_patches) {
            return Err(eyre!("boundary side {:?} refers to a missing patch", side));
        }
        Ok(Self {
            patches,
            interfaces,
            boundaries,
        })
    }

    pub fn single(geometry: Arc<dyn PatchGeometry>) -> Self {
        let boundaries = BoxSide::ALL.iter().map(|&side| PatchSide::new(0, side)).collect();
        Self {
            patches: vec![geometry],
            interfaces: Vec::new(),
            boundaries,
        }
    }

    /// An `nx x ny` grid of axis-aligned boxes covering `[0, width] x [0, height]`.
    ///
    /// Patch `(i, j)` has the index `i + nx * j`.
    pub fn grid(nx: usize, ny: usize, width: f64, height: f64) -> eyre::Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(eyre!("a patch grid needs at least one patch per direction"));
        }
        let hx = width / nx as f64;
        let hy = height / ny as f64;
        let index = |i: usize, j: usize| i + nx * j;

        let mut patches: Vec<Arc<dyn PatchGeometry>> = Vec::with_capacity(nx * ny);
        let mut interfaces = Vec::new();
        let mut boundaries = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let lower = Point2::new(i as f64 * hx, j as f64 * hy);
                let upper = Point2::new((i + 1) as f64 * hx, (j + 1) as f64 * hy);
                patches.push(Arc::new(AffineBox::new(lower, upper)));

                let k = index(i, j);
                if i + 1 < nx {
                    interfaces.push(Interface::new(
                        PatchSide::new(k, BoxSide::East),
                        PatchSide::new(index(i + 1, j), BoxSide::West),
                    ));
                }
                if j + 1 < ny {
                    interfaces.push(Interface::new(
                        PatchSide::new(k, BoxSide::North),
                        PatchSide::new(index(i, j + 1), BoxSide::South),
                    ));
                }
                if i == 0 {
                    boundaries.push(PatchSide::new(k, BoxSide::West));
                }
                if i + 1 == nx {
                    boundaries.push(PatchSide::new(k, BoxSide::East));
                }
                if j == 0 {
                    boundaries.push(PatchSide::new(k, BoxSide::South));
                }
                if j + 1 == ny {
                    boundaries.push(PatchSide::new(k, BoxSide::North));
                }
            }
        }
        Self::new(patches, interfaces, boundaries)
    }

    /// The L-shaped domain `(-1, 1)^2 \ [0, 1)^2` as three unit boxes.
    pub fn l_shape() -> eyre::Result<Self> {
        let boxes = [((-1.0, -1.0), (0.0, 0.0)), ((0.0, -1.0), (1.0, 0.0)), ((-1.0, 0.0), (0.0, 1.0))];
        let patches = boxes
            .iter()
            .map(|&((x0, y0), (x1, y1))| {
                Arc::new(AffineBox::new(Point2::new(x0, y0), Point2::new(x1, y1))) as Arc<dyn PatchGeometry>
            })
            .collect();
        let interfaces = vec![
            Interface::new(PatchSide::new(0, BoxSide::East), PatchSide::new(1, BoxSide::West)),
            Interface::new(PatchSide::new(0, BoxSide::North), PatchSide::new(2, BoxSide::South)),
        ];
        let boundaries = vec![
            PatchSide::new(0, BoxSide::West),
            PatchSide::new(0, BoxSide::South),
            PatchSide::new(1, BoxSide::South),
            PatchSide::new(1, BoxSide::East),
            PatchSide::new(1, BoxSide::North),
            PatchSide::new(2, BoxSide::West),
            PatchSide::new(2, BoxSide::North),
            PatchSide::new(2, BoxSide::East),
        ];
        Self::new(patches, interfaces, boundaries)
    }

    pub fn num_patches(&self) -> usize {
        self.patches.len()
    }

    pub fn patch(&self, index: usize) -> &dyn PatchGeometry {
        self.patches[index].as_ref()
    }

    pub fn patch_arc(&self, index: usize) -> Arc<dyn PatchGeometry> {
        Arc::clone(&self.patches[index])
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn boundaries(&self) -> &[PatchSide] {
        &self.boundaries
    }
}

/// One tensor-product basis per patch.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiBasis {
    bases: Vec<TensorBSplineBasis>,
}

impl MultiBasis {
    pub fn new(bases: Vec<TensorBSplineBasis>) -> Self {
        Self { bases }
    }

    /// The same uniform basis on every patch of `multipatch`.
    pub fn uniform(multipatch: &MultiPatch, degree: usize, num_interior: usize) -> eyre::Result<Self> {
        let basis = TensorBSplineBasis::uniform(degree, num_interior)?;
        Ok(Self::new(vec![basis; multipatch.num_patches()]))
    }

    pub fn num_patches(&self) -> usize {
        self.bases.len()
    }

    pub fn basis(&self, patch: usize) -> &TensorBSplineBasis {
        &self.bases[patch]
    }

    pub fn bases(&self) -> &[TensorBSplineBasis] {
        &self.bases
    }

    pub fn patch_sizes(&self) -> Vec<usize> {
        self.bases.iter().map(|b| b.size()).collect()
    }

    pub fn total_elements(&self) -> usize {
        self.bases.iter().map(|b| b.num_elements()).sum()
    }

    /// Offsets of the first element of each patch in the global element numbering, with a
    /// trailing entry equal to the total number of elements.
    pub fn element_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.bases.len() + 1);
        offsets.push(0);
        for basis in &self.bases {
            offsets.push(offsets[offsets.len() - 1] + basis.num_elements());
        }
        offsets
    }

    pub fn uniform_refine(&mut self) {
        for basis in &mut self.bases {
            basis.uniform_refine();
        }
    }

    /// A basis with the same breakpoints and all degrees raised by `increment`.
    pub fn with_degree_elevation(&self, increment: usize) -> Self {
        Self::new(
            self.bases
                .iter()
                .map(|b| b.with_degree_elevation(increment))
                .collect(),
        )
    }

    /// Refines the knot spans of marked elements, together with a ring of `ring` neighbouring
    /// spans in each direction, by inserting their midpoints. Interfaces are repaired
    /// afterwards so that glued sides stay conforming.
    ///
    /// `marked` is indexed by the global element numbering of [`MultiBasis::element_offsets`].
    /// Returns the number of marked elements.
    pub fn refine_elements(&mut self, marked: &[bool], ring: usize, multipatch: &MultiPatch) -> eyre::Result<usize> {
        let offsets = self.element_offsets();
        let total = offsets[offsets.len() - 1];
        if marked.len() != total {
            return Err(eyre!("expected {} element markers, got {}", total, marked.len()));
        }

        let mut num_marked = 0;
        for (patch, basis) in self.bases.iter_mut().enumerate() {
            let [m_u, m_v] = basis.elements_per_direction();
            let mut spans: [BTreeSet<usize>; 2] = [BTreeSet::new(), BTreeSet::new()];
            for local in 0..offsets[patch + 1] - offsets[patch] {
                if !marked[offsets[patch] + local] {
                    continue;
                }
                num_marked += 1;
                let (e_u, e_v) = basis.element_spans(local);
                for (direction, (e, m)) in [(e_u, m_u), (e_v, m_v)].into_iter().enumerate() {
                    let first = e.saturating_sub(ring);
                    let last = (e + ring).min(m - 1);
                    spans[direction].extend(first..=last);
                }
            }

            for (direction, spans) in spans.iter().enumerate() {
                let breaks = basis.knots(direction).breaks();
                let midpoints: Vec<f64> = spans
                    .iter()
                    .map(|&s| 0.5 * (breaks[s] + breaks[s + 1]))
                    .collect();
                basis.knots_mut(direction).insert_breaks(&midpoints);
            }
        }

        self.repair_interfaces(multipatch)?;
        Ok(num_marked)
    }

    /// Makes the knot vectors along every interface identical by merging their breakpoints.
    pub fn repair_interfaces(&mut self, multipatch: &MultiPatch) -> eyre::Result<()> {
        if multipatch.num_patches() != self.num_patches() {
            return Err(eyre!(
                "multi-patch has {} patches but the basis has {}",
                multipatch.num_patches(),
                self.num_patches()
            ));
        }

        let mut sweeps = 0;
        loop {
            let mut changed = false;
            for interface in multipatch.interfaces() {
                let (p1, p2) = (interface.first.patch, interface.second.patch);
                let direction = interface.first.side.tangent_direction();
                let degree1 = self.bases[p1].knots(direction).degree();
                let degree2 = self.bases[p2].knots(direction).degree();
                if degree1 != degree2 {
                    return Err(eyre!(
                        "patches {} and {} have different degrees ({} and {}) along their interface",
                        p1,
                        p2,
                        degree1,
                        degree2
                    ));
                }
                let breaks1 = self.bases[p1].knots(direction).breaks();
                let breaks2 = self.bases[p2].knots(direction).breaks();
                let inserted = self.bases[p1].knots_mut(direction).insert_breaks(&breaks2)
                    + self.bases[p2].knots_mut(direction).insert_breaks(&breaks1);
                changed |= inserted > 0;
            }
            sweeps += 1;
            if !changed {
                break;
            }
        }
        debug!("Interfaces repaired after {} sweeps", sweeps);
        Ok(())
    }

    /// Builds the global DOF numbering: functions on glued sides are matched, functions on
    /// the given Dirichlet sides are eliminated.
    pub fn dof_mapper(&self, multipatch: &MultiPatch, dirichlet: &[PatchSide]) -> eyre::Result<DofMapper> {
        if multipatch.num_patches() != self.num_patches() {
            return Err(eyre!(
                "multi-patch has {} patches but the basis has {}",
                multipatch.num_patches(),
                self.num_patches()
            ));
        }

        let mut builder = DofMapperBuilder::new(&self.patch_sizes());
        for interface in multipatch.interfaces() {
            let first_basis = &self.bases[interface.first.patch];
            let second_basis = &self.bases[interface.second.patch];
            let first_knots = first_basis.knots(interface.first.side.tangent_direction());
            let second_knots = second_basis.knots(interface.second.side.tangent_direction());
            if !first_knots.conforms_to(second_knots) {
                return Err(eyre!(
                    "non-conforming interface between {:?} (breaks {:?}) and {:?} (breaks {:?})",
                    interface.first,
                    first_knots.breaks(),
                    interface.second,
                    second_knots.breaks()
                ));
            }
            let first = first_basis.boundary(interface.first.side);
            let second = second_basis.boundary(interface.second.side);
            for (&i, &j) in first.iter().zip(&second) {
                builder.match_dof(interface.first.patch, i, interface.second.patch, j);
            }
        }
        for side in dirichlet {
            if side.patch >= self.num_patches() {
                return Err(eyre!("Dirichlet side {:?} refers to a missing patch", side));
            }
            for i in self.bases[side.patch].boundary(side.side) {
                builder.eliminate_dof(i, side.patch);
            }
        }
        Ok(builder.finalize())
    }
}
