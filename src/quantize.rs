//! Median-Cut Color Quantizer (spec.md §4.4) — the core of this crate.
//!
//! Reduces a BGRA frame to an `K`-entry RGB palette and a `W*H` index
//! buffer. Partitions are an index-based arena (`Vec<ColorNode>` with
//! `next: Option<u32>`) rather than a linked list of boxed nodes, per the
//! design note in spec.md §9 — a node's arena index *is* its 5-bit color
//! table slot, so the table built in pass 1 and the partition chains built
//! in pass 2 share the same storage.

use crate::error::{CatResult, Error};

/// log2 of the 5-bit-per-channel color table size: `(1<<5)^3 == 32768`.
const TABLE_SIZE: usize = 32768;

#[derive(Clone, Copy)]
struct ColorNode {
    r: u8,
    g: u8,
    b: u8,
    frequency: u32,
    palette_index: u8,
    next: Option<u32>,
}

impl ColorNode {
    const EMPTY: Self = Self { r: 0, g: 0, b: 0, frequency: 0, palette_index: 0, next: None };
}

/// A subset of the color cube with its bounding box and the colors it
/// contains (spec.md §3: `ColorSpace`).
struct Partition {
    head: Option<u32>,
    num_colors: u32,
    num_pixels: u64,
    rgb_min: [u8; 3],
    rgb_max: [u8; 3],
}

impl Partition {
    fn widest(&self) -> (usize, u16) {
        let mut best_channel = 0usize;
        let mut best_range = 0u16;
        for c in 0..3 {
            let range = u16::from(self.rgb_max[c]) - u16::from(self.rgb_min[c]);
            if range > best_range {
                best_range = range;
                best_channel = c;
            }
        }
        (best_channel, best_range)
    }
}

/// Output of [`quantize`]: an RGB8 palette of at most `K` entries and a
/// per-pixel index buffer, every entry of which is `< palette.len()`.
pub struct QuantizeResult {
    pub palette: Vec<[u8; 3]>,
    pub indices: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn slot_of(r: u8, g: u8, b: u8) -> usize {
    ((r as usize >> 3) << 10) | ((g as usize >> 3) << 5) | (b as usize >> 3)
}

/// Builds the 5-bit color table by walking the BGRA image once (spec.md
/// §4.4 step 1). `bgra` must be tightly packed, `width * height * 4` bytes.
fn build_table(bgra: &[u8], width: u32, height: u32) -> CatResult<Vec<ColorNode>> {
    let expected = width as usize * height as usize * 4;
    if bgra.len() != expected {
        return Err(Error::QuantizerInvalidInput(format!(
            "expected {expected} BGRA bytes for {width}x{height}, got {}",
            bgra.len()
        )));
    }
    let mut table = vec![ColorNode::EMPTY; TABLE_SIZE];
    for px in bgra.chunks_exact(4) {
        let (b, g, r) = (px[0], px[1], px[2]);
        let slot = slot_of(r, g, b);
        let node = &mut table[slot];
        node.frequency += 1;
        node.r = r;
        node.g = g;
        node.b = b;
    }
    Ok(table)
}

/// Links every slot with `frequency > 0` into one chain and returns the
/// initial partition spanning all of them (spec.md §4.4 step 2).
fn initial_partition(table: &mut [ColorNode]) -> Partition {
    let mut head = None;
    let mut num_colors = 0u32;
    let mut num_pixels = 0u64;
    let mut rgb_min = [255u8; 3];
    let mut rgb_max = [0u8; 3];

    // Link in descending slot order so the chain ends up in ascending order
    // (each new head's `next` is the previous head).
    for slot in (0..table.len()).rev() {
        if table[slot].frequency == 0 {
            continue;
        }
        table[slot].next = head;
        head = Some(slot as u32);
        num_colors += 1;
        num_pixels += u64::from(table[slot].frequency);
        let (r, g, b) = (table[slot].r, table[slot].g, table[slot].b);
        rgb_min[0] = rgb_min[0].min(r);
        rgb_min[1] = rgb_min[1].min(g);
        rgb_min[2] = rgb_min[2].min(b);
        rgb_max[0] = rgb_max[0].max(r);
        rgb_max[1] = rgb_max[1].max(g);
        rgb_max[2] = rgb_max[2].max(b);
    }

    Partition { head, num_colors, num_pixels, rgb_min, rgb_max }
}

fn chain_to_vec(table: &[ColorNode], head: Option<u32>) -> Vec<u32> {
    let mut out = Vec::new();
    let mut cur = head;
    while let Some(idx) = cur {
        out.push(idx);
        cur = table[idx as usize].next;
    }
    out
}

fn bounds_of(table: &[ColorNode], nodes: &[u32]) -> ([u8; 3], [u8; 3]) {
    let mut rgb_min = [255u8; 3];
    let mut rgb_max = [0u8; 3];
    for &idx in nodes {
        let n = &table[idx as usize];
        rgb_min[0] = rgb_min[0].min(n.r);
        rgb_min[1] = rgb_min[1].min(n.g);
        rgb_min[2] = rgb_min[2].min(n.b);
        rgb_max[0] = rgb_max[0].max(n.r);
        rgb_max[1] = rgb_max[1].max(n.g);
        rgb_max[2] = rgb_max[2].max(n.b);
    }
    (rgb_min, rgb_max)
}

fn relink(table: &mut [ColorNode], nodes: &[u32]) -> Option<u32> {
    for pair in nodes.windows(2) {
        table[pair[0] as usize].next = Some(pair[1]);
    }
    if let Some(&last) = nodes.last() {
        table[last as usize].next = None;
    }
    nodes.first().copied()
}

/// Splits the partition with the widest color range in two along its
/// widest channel, at the frequency median (spec.md §4.4 step 3).
fn split_widest(table: &mut [ColorNode], partitions: &mut Vec<Partition>) -> bool {
    let Some((best_idx, _)) = partitions
        .iter()
        .enumerate()
        .filter(|(_, p)| p.num_colors > 1)
        .map(|(i, p)| (i, p.widest().1))
        .fold(None, |best: Option<(usize, u16)>, (i, range)| match best {
            Some((_, best_range)) if best_range >= range => best,
            _ => Some((i, range)),
        })
    else {
        return false;
    };

    let (channel, _) = partitions[best_idx].widest();
    let mut nodes = chain_to_vec(table, partitions[best_idx].head);
    nodes.sort_by_key(|&idx| match channel {
        0 => table[idx as usize].r,
        1 => table[idx as usize].g,
        _ => table[idx as usize].b,
    });

    let half = partitions[best_idx].num_pixels / 2;
    let mut running = 0u64;
    let mut split_at = 0usize;
    for (i, &idx) in nodes.iter().enumerate() {
        running += u64::from(table[idx as usize].frequency);
        if running >= half {
            split_at = i;
            break;
        }
    }
    // Keep both halves non-empty even if the median falls in the last color.
    let split_at = split_at.min(nodes.len() - 2);

    let (first, second) = nodes.split_at(split_at + 1);

    let (first_min, first_max) = bounds_of(table, first);
    let (second_min, second_max) = bounds_of(table, second);
    let first_pixels: u64 = first.iter().map(|&i| u64::from(table[i as usize].frequency)).sum();
    let second_pixels: u64 = second.iter().map(|&i| u64::from(table[i as usize].frequency)).sum();

    let first_head = relink(table, first);
    let second_head = relink(table, second);

    partitions[best_idx] = Partition {
        head: first_head,
        num_colors: first.len() as u32,
        num_pixels: first_pixels,
        rgb_min: first_min,
        rgb_max: first_max,
    };
    partitions.push(Partition {
        head: second_head,
        num_colors: second.len() as u32,
        num_pixels: second_pixels,
        rgb_min: second_min,
        rgb_max: second_max,
    });
    true
}

/// Adds one more frame's pixels into an already-allocated table, for the
/// multi-frame combined palette used by [`quantize_combined`].
fn accumulate_table(table: &mut [ColorNode], bgra: &[u8], width: u32, height: u32) -> CatResult<()> {
    let expected = width as usize * height as usize * 4;
    if bgra.len() != expected {
        return Err(Error::QuantizerInvalidInput(format!(
            "expected {expected} BGRA bytes for {width}x{height}, got {}",
            bgra.len()
        )));
    }
    for px in bgra.chunks_exact(4) {
        let (b, g, r) = (px[0], px[1], px[2]);
        let node = &mut table[slot_of(r, g, b)];
        node.frequency += 1;
        node.r = r;
        node.g = g;
        node.b = b;
    }
    Ok(())
}

/// Frequency-weighted mean of each partition's colors, rounded to nearest
/// (spec.md §4.4 step 4). Also stamps `palette_index` onto every node, which
/// only [`partition_table`]'s callers need but costs nothing extra here.
fn emit_palette(table: &mut [ColorNode], partitions: &[Partition]) -> Vec<[u8; 3]> {
    let mut palette = Vec::with_capacity(partitions.len());
    for (ordinal, partition) in partitions.iter().enumerate() {
        let nodes = chain_to_vec(table, partition.head);
        let (mut sr, mut sg, mut sb, mut total) = (0u64, 0u64, 0u64, 0u64);
        for &idx in &nodes {
            let n = &table[idx as usize];
            let f = u64::from(n.frequency);
            sr += u64::from(n.r) * f;
            sg += u64::from(n.g) * f;
            sb += u64::from(n.b) * f;
            total += f;
        }
        let round_div = |s: u64| -> u8 {
            if total == 0 {
                0
            } else {
                ((s + total / 2) / total) as u8
            }
        };
        palette.push([round_div(sr), round_div(sg), round_div(sb)]);
        for &idx in &nodes {
            table[idx as usize].palette_index = ordinal as u8;
        }
    }
    palette
}

fn validate_k(k: u16) -> CatResult<()> {
    if k < 2 || k > 256 || !k.is_power_of_two() {
        return Err(Error::InvalidConfig(format!("palette size must be a power of two in 2..=256, got {k}")));
    }
    Ok(())
}

fn split_until(table: &mut [ColorNode], partitions: &mut Vec<Partition>, k: u16) {
    while partitions.len() < k as usize {
        if !split_widest(table, partitions) {
            break;
        }
    }
}

/// Builds the table, partitions it into at most `k` groups, and assigns a
/// `palette_index` to every active slot. Shared by [`quantize`] (which only
/// needs the palette + index buffer) and [`ColorLookup`] (which keeps the
/// table around for the ditherer's per-pixel lookups).
fn partition_table(bgra: &[u8], width: u32, height: u32, k: u16) -> CatResult<(Vec<ColorNode>, Vec<[u8; 3]>)> {
    validate_k(k)?;
    let mut table = build_table(bgra, width, height)?;
    let initial = initial_partition(&mut table);
    let mut partitions = vec![initial];
    split_until(&mut table, &mut partitions, k);
    let palette = emit_palette(&mut table, &partitions);
    Ok((table, palette))
}

/// Quantizes the union of several same-sized frames into one palette
/// (spec.md §4.6 Open Question b: global-palette construction as a two-pass
/// buffered quantization over every frame's colors rather than just one).
pub fn quantize_combined(frames: &[&[u8]], width: u32, height: u32, k: u16) -> CatResult<Vec<[u8; 3]>> {
    validate_k(k)?;
    let mut table = vec![ColorNode::EMPTY; TABLE_SIZE];
    for &bgra in frames {
        accumulate_table(&mut table, bgra, width, height)?;
    }
    let initial = initial_partition(&mut table);
    let mut partitions = vec![initial];
    split_until(&mut table, &mut partitions, k);
    Ok(emit_palette(&mut table, &partitions))
}

/// Runs median-cut quantization over a tightly packed BGRA buffer.
/// `k` must be a power of two in `2..=256` (spec.md §4.4 edge cases).
pub fn quantize(bgra: &[u8], width: u32, height: u32, k: u16) -> CatResult<QuantizeResult> {
    let (table, palette) = partition_table(bgra, width, height, k)?;

    let mut indices = Vec::with_capacity(width as usize * height as usize);
    for px in bgra.chunks_exact(4) {
        let (b, g, r) = (px[0], px[1], px[2]);
        let slot = slot_of(r, g, b);
        indices.push(table[slot].palette_index);
    }

    Ok(QuantizeResult { palette, indices, width, height })
}

/// The 5-bit lookup table built from a frame, retained so the ditherer
/// (spec.md §4.5) can reuse it without re-walking the image.
pub struct ColorLookup {
    table: Vec<ColorNode>,
    pub palette: Vec<[u8; 3]>,
}

impl ColorLookup {
    pub fn build(bgra: &[u8], width: u32, height: u32, k: u16) -> CatResult<Self> {
        let (table, palette) = partition_table(bgra, width, height, k)?;
        Ok(Self { table, palette })
    }

    /// Palette index for an arbitrary 8-bit RGB color, via its 5-bit cell.
    pub fn index_of(&self, r: u8, g: u8, b: u8) -> u8 {
        self.table[slot_of(r, g, b)].palette_index
    }

    /// The RGB color a palette index resolves to.
    pub fn palette_color(&self, index: u8) -> [u8; 3] {
        self.palette[index as usize]
    }

    /// Builds a lookup against a palette that wasn't derived from this
    /// frame's own colors — e.g. the GIF Assembler's global two-pass
    /// palette (spec.md §4.6 Open Question b). Every one of the 32768
    /// cells is assigned to its nearest palette entry by brute force; this
    /// only runs once per frame, not per pixel.
    pub fn from_palette(palette: Vec<[u8; 3]>) -> Self {
        let mut table = vec![ColorNode::EMPTY; TABLE_SIZE];
        for r5 in 0u32..32 {
            for g5 in 0u32..32 {
                for b5 in 0u32..32 {
                    let slot = ((r5 as usize) << 10) | ((g5 as usize) << 5) | b5 as usize;
                    let (r, g, b) = (r5 * 8 + 4, g5 * 8 + 4, b5 * 8 + 4);
                    let mut best = 0usize;
                    let mut best_dist = u32::MAX;
                    for (i, p) in palette.iter().enumerate() {
                        let dr = r as i32 - p[0] as i32;
                        let dg = g as i32 - p[1] as i32;
                        let db = b as i32 - p[2] as i32;
                        let dist = (dr * dr + dg * dg + db * db) as u32;
                        if dist < best_dist {
                            best_dist = dist;
                            best = i;
                        }
                    }
                    table[slot].palette_index = best as u8;
                }
            }
        }
        Self { table, palette }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_bgra(color: [u8; 4], w: u32, h: u32) -> Vec<u8> {
        color.iter().copied().cycle().take(w as usize * h as usize * 4).collect()
    }

    #[test]
    fn rejects_non_power_of_two_k() {
        let img = solid_bgra([0, 0, 0, 255], 2, 2);
        assert!(quantize(&img, 2, 2, 3).is_err());
        assert!(quantize(&img, 2, 2, 1).is_err());
    }

    #[test]
    fn uniform_image_yields_single_color_palette() {
        let img = solid_bgra([10, 20, 30, 255], 4, 4);
        let result = quantize(&img, 4, 4, 4).unwrap();
        assert_eq!(result.palette.len(), 1);
        assert!(result.indices.iter().all(|&i| i == 0));
    }

    #[test]
    fn every_index_is_in_range() {
        // A 4-color image, pseudo-randomly scattered, with K=4.
        let mut img = Vec::new();
        let colors = [[10, 20, 30, 255u8], [200, 0, 0, 255], [0, 200, 0, 255], [0, 0, 200, 255]];
        for i in 0..64usize {
            img.extend_from_slice(&colors[i % colors.len()]);
        }
        let result = quantize(&img, 8, 8, 4).unwrap();
        assert!(result.indices.iter().all(|&i| (i as usize) < result.palette.len()));
        assert_eq!(result.palette.len(), 4);
    }

    #[test]
    fn k_equals_two_on_two_color_image_partitions_correctly() {
        let mut img = Vec::new();
        for _ in 0..2 {
            img.extend_from_slice(&[0, 0, 0, 255]);
        }
        for _ in 0..2 {
            img.extend_from_slice(&[100, 100, 100, 255]);
        }
        let result = quantize(&img, 2, 2, 2).unwrap();
        assert_eq!(result.palette.len(), 2);
        assert_eq!(&result.indices[0..2], &[result.indices[0]; 2]);
        assert_eq!(&result.indices[2..4], &[result.indices[2]; 2]);
        assert_ne!(result.indices[0], result.indices[2]);
    }

    #[test]
    fn fewer_than_k_distinct_colors_truncates_palette() {
        let img = solid_bgra([5, 5, 5, 255], 2, 2);
        let result = quantize(&img, 2, 2, 8).unwrap();
        assert!(result.palette.len() <= 8);
        assert_eq!(result.palette.len(), 1);
    }

    #[test]
    fn partition_bounding_boxes_match_spec_example() {
        // spec.md §8 scenario 2: six colors, K=4, widest initial channel is Red.
        let colors: [[u8; 3]; 6] =
            [[200, 0, 0], [100, 1, 200], [80, 100, 0], [50, 200, 100], [0, 100, 22], [0, 55, 100]];
        let mut img = Vec::new();
        for c in &colors {
            img.extend_from_slice(&[c[2], c[1], c[0], 255]); // BGRA
        }
        let mut table = build_table(&img, 6, 1).unwrap();
        let initial = initial_partition(&mut table);
        assert_eq!(initial.widest().0, 0); // Red is widest initially.

        let mut partitions = vec![initial];
        split_until(&mut table, &mut partitions, 4);
        assert_eq!(partitions.len(), 4);

        // Walking the median-cut splits by hand against these six colors
        // gives this exact sequence: split on R (median at c3=50) yields
        // {c5,c4,c3} and {c2,c1,c0}; the second half is then split on B
        // (widest range, 200) into {c2} and {c1,c0}; {c1,c0} splits on B
        // again into {c0} and {c1}.
        let expected: [([u8; 3], [u8; 3]); 4] = [
            ([0, 55, 22], [50, 200, 100]),
            ([80, 100, 0], [80, 100, 0]),
            ([200, 0, 0], [200, 0, 0]),
            ([100, 1, 200], [100, 1, 200]),
        ];
        let bounds: Vec<([u8; 3], [u8; 3])> = partitions.iter().map(|p| (p.rgb_min, p.rgb_max)).collect();
        assert_eq!(bounds, expected);

        // spec.md §8's general invariant: every member color of a partition
        // falls within that partition's own bounding box, which is tight
        // (matches the box recomputed from the partition's actual members).
        for partition in &partitions {
            let members = chain_to_vec(&table, partition.head);
            assert!(!members.is_empty());
            let (recomputed_min, recomputed_max) = bounds_of(&table, &members);
            assert_eq!(partition.rgb_min, recomputed_min);
            assert_eq!(partition.rgb_max, recomputed_max);
            for &idx in &members {
                let n = &table[idx as usize];
                for c in 0..3 {
                    let value = [n.r, n.g, n.b][c];
                    assert!(partition.rgb_min[c] <= value && value <= partition.rgb_max[c]);
                }
            }
        }

        let result = quantize(&img, 6, 1, 4).unwrap();
        assert_eq!(result.palette.len(), 4);
        for &idx in &result.indices {
            assert!((idx as usize) < result.palette.len());
        }
    }

    #[test]
    fn combined_palette_covers_colors_absent_from_any_single_frame() {
        let black = solid_bgra([0, 0, 0, 255], 2, 2);
        let white = solid_bgra([255, 255, 255, 255], 2, 2);
        let palette = quantize_combined(&[&black, &white], 2, 2, 2).unwrap();
        assert_eq!(palette.len(), 2);
        let has = |c: [u8; 3]| palette.iter().any(|&p| p == c);
        assert!(has([0, 0, 0]));
        assert!(has([255, 255, 255]));
    }
}
