//! Gravitational-wave observables (`spec.md` §4.7).
//!
//! Given the 4-tuple `(T*, α_PT, β/H, v_w)` produced by
//! [`crate::bounce_solution::BounceSolution`], builds the sound-wave and
//! MHD-turbulence spectra and a signal-to-noise ratio against LISA's
//! power-spectral density. The closed forms below follow the standard
//! templates cited by `spec.md` §4.7; where the cited references
//! (1704.05871, 2305.02357) were not available to this implementation the
//! formula is held fixed as a documented ansatz rather than re-derived (see
//! `DESIGN.md`), mirroring [`crate::bounce_solution::BounceSolution::wall_velocity_bound`].

use crate::ode::quadrature_with_panels;

/// Sound speed in the relativistic plasma, `c_s = 1/√3`.
const SOUND_SPEED: f64 = 0.577_350_269_189_625_8;

/// Reduced Hubble constant used to convert `H*` into an observed-today
/// frequency.
const REDUCED_HUBBLE: f64 = 0.674;

/// Whether the sound-wave and turbulence contributions are switched on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub struct ComponentSwitches {
    /// Sound-wave contribution enabled.
    pub sound_wave: bool,
    /// MHD-turbulence contribution enabled.
    pub turbulence: bool,
}

impl Default for ComponentSwitches {
    fn default() -> Self {
        Self { sound_wave: true, turbulence: true }
    }
}

/// Tuning knobs for [`GravitationalWave::new`].
#[derive(Clone, Debug)]
pub struct GravitationalWaveConfig {
    /// Which spectral components to include.
    pub components: ComponentSwitches,
    /// `ε_turb` input: sentinel `-1` resolves via
    /// [`turbulence_efficiency_bound`], else used as-is in `[0, 1]`.
    pub eps_turb: f64,
    /// Relativistic degrees of freedom at `T*`.
    pub g_star: f64,
    /// Observation time for the SNR integral, years.
    pub t_obs_years: f64,
    /// Number of panels for the SNR quadrature.
    pub snr_panels: usize,
}

impl Default for GravitationalWaveConfig {
    fn default() -> Self {
        Self {
            components: ComponentSwitches::default(),
            eps_turb: -1.0,
            g_star: 106.75,
            t_obs_years: 3.0,
            snr_panels: 400,
        }
    }
}

/// Resolves the `ε_turb` sentinel documented in `spec.md` §4.7: `-1` uses
/// the upper-bound ansatz `0.05·α/(1+α)` (held constant in place of the
/// unavailable 1704.05871 derivation); anything else is clamped to
/// `[0, 1]`.
#[must_use]
pub fn turbulence_efficiency_bound(sentinel: f64, alpha: f64) -> f64 {
    if (sentinel + 1.0).abs() < 1e-9 {
        (0.05 * alpha / (1.0 + alpha)).min(1.0)
    } else {
        sentinel.clamp(0.0, 1.0)
    }
}

/// Efficiency factor `κ_sw` converting latent heat into bulk fluid motion,
/// as a function of transition strength and wall velocity. Uses the
/// standard weak/strong-transition asymptotes (Espinosa et al.) smoothly
/// interpolated across the detonation/deflagration/hybrid regimes implied
/// by `v_w` vs `c_s`.
#[must_use]
pub fn kappa_sw(alpha: f64, v_w: f64) -> f64 {
    let kappa_a = 6.9 * alpha / (1.36 - 0.037 * alpha.sqrt() + alpha);
    let kappa_b = alpha.powf(0.4) / (0.017 + (0.997 + alpha).powf(0.4));
    let kappa_d = alpha / (0.73 + 0.083 * alpha.sqrt() + alpha);

    if v_w <= SOUND_SPEED {
        // deflagration: blend from the small-v_w limit kappa_a up to
        // kappa_b at v_w = c_s, matching the detonation branch there.
        let x = v_w / SOUND_SPEED;
        kappa_a * kappa_b / (kappa_b + (kappa_a - kappa_b) * x)
    } else {
        // detonation/hybrid: linear blend from the sound-speed value
        // kappa_b up to the ultra-relativistic value kappa_d at v_w = 1.
        let frac = (v_w - SOUND_SPEED) / (1.0 - SOUND_SPEED);
        kappa_b + frac * (kappa_d - kappa_b)
    }
}

/// Fraction of the total bubble energy converted to bulk fluid kinetic
/// energy, `K_sw = κ_sw·α/(1+α)`.
#[must_use]
pub fn k_sw(alpha: f64, v_w: f64) -> f64 {
    kappa_sw(alpha, v_w) * alpha / (1.0 + alpha)
}

/// Time scale times characteristic fluid velocity, `H*R = (8π)^{1/3}
/// ·max(v_w, c_s)/(β/H)`.
#[must_use]
pub fn hr(beta_over_h: f64, v_w: f64) -> f64 {
    (8.0 * std::f64::consts::PI).cbrt() * v_w.max(SOUND_SPEED) / beta_over_h.max(1e-300)
}

/// Fraction of `K_sw` that cascades into MHD turbulence, `K_turb =
/// ε_turb·K_sw`.
#[must_use]
pub fn k_turb(alpha: f64, v_w: f64, eps_turb: f64) -> f64 {
    eps_turb * k_sw(alpha, v_w)
}

/// Whether the sound-shell turns over within a Hubble time
/// (`H*τ_sh ≈ 1`) rather than persisting as a long-lived source
/// (`H*τ_sh ≪ 1`), which sets the exponent of the lifetime suppression
/// factor applied to the sound-wave amplitude.
#[must_use]
pub fn is_fluid_turnover_approx_one(hr: f64, k: f64) -> bool {
    let tau_sh = hr / k.sqrt().max(1e-300);
    tau_sh >= 1.0
}

/// Peak frequency of the sound-wave spectrum, redshifted to today.
#[must_use]
pub fn peak_frequency_sound_wave(beta_over_h: f64, v_w: f64, t_star: f64, g_star: f64) -> f64 {
    let z_p = 10.0;
    1.9e-5 * (z_p / 10.0) * (1.0 / v_w) * (beta_over_h / 100.0) * (t_star / 100.0) * (g_star / 100.0).powf(1.0 / 6.0)
}

/// Peak amplitude `h²Ω_peak` of the sound-wave spectrum.
#[must_use]
pub fn peak_amplitude_sound_wave(alpha: f64, beta_over_h: f64, v_w: f64, g_star: f64) -> f64 {
    let k = k_sw(alpha, v_w);
    let hstar_r = hr(beta_over_h, v_w);
    let suppression = if is_fluid_turnover_approx_one(hstar_r, k) {
        hstar_r / (1.0 + hstar_r)
    } else {
        1.0
    };
    2.061 * REDUCED_HUBBLE.powi(2) * 0.678 * hstar_r * k.powi(2) * (100.0 / g_star).powf(1.0 / 3.0) * suppression
}

/// Peak frequency of the MHD-turbulence spectrum, redshifted to today.
#[must_use]
pub fn peak_frequency_turbulence(beta_over_h: f64, v_w: f64, t_star: f64, g_star: f64) -> f64 {
    let z_p = 3.5;
    2.7e-5 * (z_p / 3.5) * (1.0 / v_w) * (beta_over_h / 100.0) * (t_star / 100.0) * (g_star / 100.0).powf(1.0 / 6.0)
}

/// Peak amplitude `h²Ω_peak` of the MHD-turbulence spectrum.
#[must_use]
pub fn peak_amplitude_turbulence(alpha: f64, beta_over_h: f64, v_w: f64, eps_turb: f64, g_star: f64) -> f64 {
    let k = k_turb(alpha, v_w, eps_turb);
    let hstar_r = hr(beta_over_h, v_w);
    3.35 * REDUCED_HUBBLE.powi(2) * 0.01 * hstar_r * k.powf(1.5) * (100.0 / g_star).powf(1.0 / 3.0)
}

/// Double-broken-power-law sound-wave spectrum, normalized to unit value
/// at `f = f_peak`: rises as `f³` below the peak and falls as `f^{-4}`
/// above it.
#[must_use]
pub fn h2omega_sound_wave(f: f64, f_peak: f64, h2omega_peak: f64) -> f64 {
    if f <= 0.0 || f_peak <= 0.0 {
        return 0.0;
    }
    let x = f / f_peak;
    h2omega_peak * x.powi(3) * (7.0 / (4.0 + 3.0 * x * x)).powf(3.5)
}

/// Single-broken-power-law MHD-turbulence spectrum: rises as `f³` below
/// the peak, falls as `f^{-8/3}` above it (damped by a Hubble-horizon
/// cutoff that flattens the far tail).
#[must_use]
pub fn h2omega_turbulence(f: f64, f_peak: f64, h2omega_peak: f64, h_star_today: f64) -> f64 {
    if f <= 0.0 || f_peak <= 0.0 {
        return 0.0;
    }
    let x = f / f_peak;
    let cutoff = 1.0 + 8.0 * std::f64::consts::PI * f / h_star_today.max(1e-300);
    h2omega_peak * x.powi(3) / ((1.0 + x).powf(11.0 / 3.0) * cutoff)
}

/// LISA power-spectral-density component `S_I(f)`, single-link optical
/// metrology noise (Caprini et al., "Science with LISA").
#[must_use]
pub fn si_func(f: f64) -> f64 {
    5.76e-48 * (1.0 + (0.4e-3 / f).powi(2))
}

/// LISA transfer-function component `R(f)`.
#[must_use]
pub fn r_func(f: f64) -> f64 {
    0.3 / (1.0 + 0.6 * (f / 25e-3).powi(2))
}

/// LISA strain power spectral density, `S_I(f)/R(f)`.
#[must_use]
pub fn powspec_density(f: f64) -> f64 {
    si_func(f) / r_func(f)
}

/// LISA sensitivity curve expressed as `h²Ω_sens(f)`.
#[must_use]
pub fn h2omega_sensitivity(f: f64) -> f64 {
    let freq_to_omega = 4.0 * std::f64::consts::PI * std::f64::consts::PI * f.powi(3) / (3.0 * (100.0 * 3.24e-20_f64 * REDUCED_HUBBLE).powi(2));
    freq_to_omega * powspec_density(f)
}

/// One resolved gravitational-wave prediction (`spec.md` §4.7, mirroring
/// `GravitationalWaveData` in the companion C++ implementation).
#[derive(Clone, Debug, serde::Serialize)]
pub struct GravitationalWave {
    /// Sound-wave contribution enabled.
    pub sound_wave_on: bool,
    /// Turbulence contribution enabled.
    pub turbulence_on: bool,
    /// Transition temperature the spectrum is evaluated at.
    pub t_star: f64,
    /// Transition strength `α_PT`.
    pub alpha_pt: f64,
    /// Inverse time scale `β/H`.
    pub beta_over_h: f64,
    /// Bubble-wall velocity.
    pub v_w: f64,
    /// `ε_turb` used.
    pub eps_turb: f64,
    /// Peak frequency, sound waves, Hz (today).
    pub f_peak_sound_wave: f64,
    /// Peak amplitude, sound waves.
    pub h2omega_peak_sound_wave: f64,
    /// Peak frequency, turbulence, Hz (today).
    pub f_peak_turbulence: f64,
    /// Peak amplitude, turbulence.
    pub h2omega_peak_turbulence: f64,
    /// Panel count for the [`GravitationalWave::snr`] quadrature.
    #[serde(skip)]
    snr_panels: usize,
}

impl GravitationalWave {
    /// Builds the spectrum summary from the resolved transition 4-tuple.
    #[must_use]
    pub fn new(t_star: f64, alpha_pt: f64, beta_over_h: f64, v_w: f64, cfg: &GravitationalWaveConfig) -> Self {
        let eps_turb = turbulence_efficiency_bound(cfg.eps_turb, alpha_pt);
        Self {
            sound_wave_on: cfg.components.sound_wave,
            turbulence_on: cfg.components.turbulence,
            t_star,
            alpha_pt,
            beta_over_h,
            v_w,
            eps_turb,
            f_peak_sound_wave: peak_frequency_sound_wave(beta_over_h, v_w, t_star, cfg.g_star),
            h2omega_peak_sound_wave: peak_amplitude_sound_wave(alpha_pt, beta_over_h, v_w, cfg.g_star),
            f_peak_turbulence: peak_frequency_turbulence(beta_over_h, v_w, t_star, cfg.g_star),
            h2omega_peak_turbulence: peak_amplitude_turbulence(alpha_pt, beta_over_h, v_w, eps_turb, cfg.g_star),
            snr_panels: cfg.snr_panels,
        }
    }

    /// Total `h²Ω_GW(f)`, the sum of whichever components are enabled.
    #[must_use]
    pub fn amplitude_at(&self, f: f64) -> f64 {
        let mut total = 0.0;
        if self.sound_wave_on {
            total += h2omega_sound_wave(f, self.f_peak_sound_wave, self.h2omega_peak_sound_wave);
        }
        if self.turbulence_on {
            total += h2omega_turbulence(f, self.f_peak_turbulence, self.h2omega_peak_turbulence, self.f_peak_turbulence);
        }
        total
    }

    /// Signal-to-noise ratio against LISA, integrating
    /// `[h²Ω_signal(f)/h²Ω_sens(f)]²` over `[f_min, f_max]` and scaling by
    /// the observation time.
    #[must_use]
    pub fn snr(&self, f_min: f64, f_max: f64, t_obs_years: f64) -> f64 {
        if f_max <= f_min || f_min <= 0.0 {
            return 0.0;
        }
        let seconds_per_year = 365.25 * 24.0 * 3600.0;
        let t_obs = t_obs_years * seconds_per_year;
        let integrand = |f: f64| {
            let ratio = self.amplitude_at(f) / h2omega_sensitivity(f).max(1e-300);
            ratio * ratio
        };
        let integral = quadrature_with_panels(integrand, f_min, f_max, self.snr_panels);
        (t_obs * integral).max(0.0).sqrt()
    }
}
